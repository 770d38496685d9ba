//! Plain-text summary of the node gauges, served on `/summary`.

use std::fmt::Write;

use prometheus::proto::{LabelPair, MetricFamily, MetricType};

use super::prometheus_metrics::{
    BLOCK_HEIGHT, CONNECTION_STATUS, TRANSACTIONS_ABOVE_THRESHOLD, VOLUME_ABOVE_THRESHOLD,
};

const SECTIONS: [(&str, &[&str]); 2] = [
    ("Bitcoin Node Status", &[BLOCK_HEIGHT, CONNECTION_STATUS]),
    (
        "Transaction Summary",
        &[TRANSACTIONS_ABOVE_THRESHOLD, VOLUME_ABOVE_THRESHOLD],
    ),
];

/// Groups the node gauges into titled sections, one `name{labels} value`
/// line per gauge sample. Families of other types are ignored.
pub fn format_summary(families: &[MetricFamily]) -> String {
    let mut out = String::new();
    for (title, names) in SECTIONS {
        let _ = writeln!(out, "# {title}");
        for name in names {
            for family in families.iter().filter(|f| f.get_name() == *name) {
                write_gauges(&mut out, family);
            }
        }
        out.push('\n');
    }
    out
}

fn write_gauges(out: &mut String, family: &MetricFamily) {
    if family.get_field_type() != MetricType::GAUGE {
        return;
    }
    for metric in family.get_metric() {
        let _ = writeln!(
            out,
            "{}{} {}",
            family.get_name(),
            labels_to_string(metric.get_label()),
            metric.get_gauge().get_value()
        );
    }
}

fn labels_to_string(labels: &[LabelPair]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = labels
        .iter()
        .map(|l| format!("{}=\"{}\"", l.get_name(), l.get_value()))
        .collect();
    format!("{{{}}}", pairs.join(","))
}
