//! Apply a templated manifest to the current cluster context.
//!
//! Usage: cargo run --example builder_apply -- [namespace]

use std::collections::HashMap;

use gtmpl::Value;
use remora_apply::Applier;

const MANIFEST: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: remora-demo
data:
  greeting: hello from {{ .Namespace }}
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let namespace = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "default".to_string());

    let client = remora_apply::default_client().await?;
    let applier = Applier::from_client(client, "remora-example")?;

    let mut data = HashMap::new();
    data.insert("Namespace".to_string(), Value::String(namespace.clone()));

    applier
        .builder()
        .with_namespace(&namespace)
        .with_yaml_resource("demo.yaml", MANIFEST)
        .with_template("demo.yaml", Value::Map(data))
        .execute_apply()
        .await?;

    println!("applied ConfigMap remora-demo to namespace {}", namespace);
    Ok(())
}
