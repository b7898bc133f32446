//! Prometheus text exposition format (version 0.0.4).

use std::fmt::Write;

/// Content type served alongside [`encode`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
    Summary,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
            Self::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Appended to the family name, e.g. `_sum` for summaries.
    pub suffix: &'static str,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    pub fn plain(value: f64) -> Self {
        Self {
            suffix: "",
            labels: Vec::new(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

/// Write families, then one `# ERROR` comment line per failure.
pub fn encode<'a>(
    families: impl IntoIterator<Item = &'a MetricFamily>,
    errors: impl IntoIterator<Item = String>,
) -> String {
    let mut out = String::new();
    for family in families {
        // Writing into a String cannot fail.
        let _ = write_family(&mut out, family);
    }
    for error in errors {
        let _ = writeln!(out, "# ERROR {}", escape_help(&error));
    }
    out
}

fn write_family(out: &mut String, family: &MetricFamily) -> std::fmt::Result {
    writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help))?;
    writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str())?;
    for sample in &family.samples {
        write!(out, "{}{}", family.name, sample.suffix)?;
        if !sample.labels.is_empty() {
            let labels: Vec<_> = sample
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
                .collect();
            write!(out, "{{{}}}", labels.join(","))?;
        }
        writeln!(out, " {}", format_value(sample.value))?;
    }
    Ok(())
}

fn escape_help(input: &str) -> String {
    input.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label(input: &str) -> String {
    escape_help(input).replace('"', "\\\"")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
