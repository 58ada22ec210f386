//! Generate CRD YAML for MonitorStack

use kube::CustomResourceExt;

use monitor_operator::crds::MonitorStack;

fn main() -> anyhow::Result<()> {
    let crd = MonitorStack::crd();
    println!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
