//! # CRD Generator
//!
//! Prints the `Certificate` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/certificate.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use certificate_operator::crd::Certificate;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Certificate::crd())?);
    Ok(())
}
