use serde::Serialize;

use crate::constants::{defaults, ports};
use crate::crds::DatasourceSpec;

/// Generate the default `prometheus.yml`.
///
/// Scrapes Prometheus itself plus every pod and service annotated with
/// `prometheus.io/scrape: "true"`, honouring the `prometheus.io/path` and
/// `prometheus.io/port` annotations, and every node.
pub fn generate_prometheus_config() -> Result<String, serde_yaml::Error> {
    let config = PrometheusYaml {
        global: GlobalConfig {
            scrape_interval: "15s",
            evaluation_interval: "15s",
        },
        scrape_configs: vec![
            ScrapeConfig {
                job_name: "prometheus",
                static_configs: Some(vec![StaticConfig {
                    targets: vec![format!("localhost:{}", ports::PROMETHEUS)],
                }]),
                kubernetes_sd_configs: None,
                relabel_configs: Vec::new(),
            },
            annotated_scrape_job("kubernetes-pods", "pod"),
            annotated_scrape_job("kubernetes-services", "service"),
            ScrapeConfig {
                job_name: "kubernetes-nodes",
                static_configs: None,
                kubernetes_sd_configs: Some(vec![SdConfig { role: "node" }]),
                relabel_configs: vec![copy_label(
                    "__meta_kubernetes_node_name",
                    "kubernetes_node_name",
                )],
            },
        ],
        rule_files: Vec::new(),
    };

    serde_yaml::to_string(&config)
}

/// Generate the Grafana datasource provisioning document.
///
/// Only the first datasource can be the default, and only when it is a
/// Prometheus datasource.
pub fn generate_datasources(datasources: &[DatasourceSpec]) -> Result<String, serde_yaml::Error> {
    let doc = DatasourcesYaml {
        api_version: 1,
        datasources: datasources
            .iter()
            .enumerate()
            .map(|(i, ds)| DatasourceEntry {
                name: &ds.name,
                type_: &ds.type_,
                url: &ds.url,
                access: "proxy",
                is_default: i == 0 && ds.type_ == defaults::DEFAULT_DATASOURCE_TYPE,
            })
            .collect(),
    };

    serde_yaml::to_string(&doc)
}

/// Discovery job for pods or services opting in through annotations.
fn annotated_scrape_job(job_name: &'static str, role: &'static str) -> ScrapeConfig {
    let annotation = |name: &str| format!("__meta_kubernetes_{role}_annotation_prometheus_io_{name}");

    ScrapeConfig {
        job_name,
        static_configs: None,
        kubernetes_sd_configs: Some(vec![SdConfig { role }]),
        relabel_configs: vec![
            RelabelConfig {
                source_labels: vec![annotation("scrape")],
                action: "keep",
                regex: Some("true".into()),
                ..Default::default()
            },
            RelabelConfig {
                source_labels: vec![annotation("path")],
                action: "replace",
                target_label: Some("__metrics_path__".into()),
                regex: Some("(.+)".into()),
                ..Default::default()
            },
            RelabelConfig {
                source_labels: vec!["__address__".into(), annotation("port")],
                action: "replace",
                regex: Some(r"([^:]+)(?::\d+)?;(\d+)".into()),
                replacement: Some("$1:$2".into()),
                target_label: Some("__address__".into()),
            },
            copy_label(
                &format!("__meta_kubernetes_{role}_name"),
                &format!("kubernetes_{role}_name"),
            ),
            copy_label("__meta_kubernetes_namespace", "kubernetes_namespace"),
        ],
    }
}

fn copy_label(source: &str, target: &str) -> RelabelConfig {
    RelabelConfig {
        source_labels: vec![source.into()],
        action: "replace",
        target_label: Some(target.into()),
        ..Default::default()
    }
}

#[derive(Serialize)]
struct PrometheusYaml {
    global: GlobalConfig,
    scrape_configs: Vec<ScrapeConfig>,
    rule_files: Vec<String>,
}

#[derive(Serialize)]
struct GlobalConfig {
    scrape_interval: &'static str,
    evaluation_interval: &'static str,
}

#[derive(Serialize)]
struct ScrapeConfig {
    job_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    static_configs: Option<Vec<StaticConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kubernetes_sd_configs: Option<Vec<SdConfig>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    relabel_configs: Vec<RelabelConfig>,
}

#[derive(Serialize)]
struct StaticConfig {
    targets: Vec<String>,
}

#[derive(Serialize)]
struct SdConfig {
    role: &'static str,
}

#[derive(Serialize, Default)]
struct RelabelConfig {
    source_labels: Vec<String>,
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    replacement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_label: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasourcesYaml<'a> {
    api_version: u32,
    datasources: Vec<DatasourceEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasourceEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_: &'a str,
    url: &'a str,
    access: &'static str,
    is_default: bool,
}
