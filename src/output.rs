use clap::ValueEnum;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::{ClassifiedParameter, VulnCategory};
use crate::error::{Error, Result};
use crate::extract::Confidence;
use crate::utils::{colors_enabled, trim_token};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Txt,
    Csv,
    Json,
}

/// Flat export row for one parameter.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ParameterRecord {
    pub name: String,
    pub origin: Option<String>,
    pub confidence: Confidence,
    pub is_suspicious: bool,
    pub suspicious_type: Option<VulnCategory>,
}

impl From<&ClassifiedParameter> for ParameterRecord {
    fn from(p: &ClassifiedParameter) -> Self {
        ParameterRecord {
            name: p.parameter.name.clone(),
            origin: p.parameter.origin.clone(),
            confidence: p.parameter.confidence,
            is_suspicious: p.is_suspicious,
            suspicious_type: p.category,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub include_origin: bool,
    pub report_sus: bool,
    pub sus_only: bool,
}

pub fn build_records(params: &[ClassifiedParameter], sus_only: bool) -> Vec<ParameterRecord> {
    params.iter().filter(|p| !sus_only || p.is_suspicious).map(ParameterRecord::from).collect()
}

pub fn render_txt(
    records: &[ParameterRecord],
    include_origin: bool,
    tag_suspicious: bool,
) -> String {
    let mut out = String::new();
    for rec in records {
        out.push_str(&rec.name);
        if include_origin {
            if let Some(origin) = &rec.origin {
                let _ = write!(out, " [origin: {}]", origin);
            }
        }
        if tag_suspicious {
            if let Some(cat) = rec.suspicious_type {
                let _ = write!(out, " [suspicious: {}]", cat);
            }
        }
        out.push('\n');
    }
    out
}

pub fn render_csv(records: &[ParameterRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Parameter", "Origin", "Confidence", "Is_Suspicious", "Suspicious_Type"])?;
    for rec in records {
        let suspicious = if rec.is_suspicious { "true" } else { "false" };
        let category = rec.suspicious_type.map(|c| c.label()).unwrap_or("");
        writer.write_record([
            rec.name.as_str(),
            rec.origin.as_deref().unwrap_or(""),
            rec.confidence.label(),
            suspicious,
            category,
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn render_json(records: &[ParameterRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn render(records: &[ParameterRecord], options: &ExportOptions) -> Result<String> {
    match options.format {
        ExportFormat::Txt => Ok(render_txt(records, options.include_origin, options.report_sus)),
        ExportFormat::Csv => render_csv(records),
        ExportFormat::Json => render_json(records),
    }
}

/// `out/params.csv` -> `out/params_suspicious.txt`
pub fn sidecar_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}_suspicious.txt", stem))
}

/// Writes the export and, with `report_sus`, the suspicious sidecar next to
/// it. Returns the sidecar path when one was written.
pub fn write_export(
    path: &Path,
    records: &[ParameterRecord],
    options: &ExportOptions,
) -> Result<Option<PathBuf>> {
    fs::write(path, render(records, options)?)?;

    if !options.report_sus {
        return Ok(None);
    }
    let mut sidecar = String::new();
    for rec in records.iter().filter(|r| r.is_suspicious) {
        match rec.suspicious_type {
            Some(cat) => {
                let _ = writeln!(sidecar, "{} [{}]", rec.name, cat);
            }
            None => {
                let _ = writeln!(sidecar, "{}", rec.name);
            }
        }
    }
    let side = sidecar_path(path);
    fs::write(&side, sidecar)?;
    Ok(Some(side))
}

/// Stdout rendering used when no output file is given.
pub fn print_console(records: &[ParameterRecord], include_origin: bool) {
    for rec in records {
        let mut line = String::new();
        match rec.suspicious_type {
            Some(cat) if colors_enabled() => {
                let tag = format!("[{}]", cat);
                let _ = write!(line, "{} {}", rec.name.bright_red().bold(), tag.bright_yellow());
            }
            Some(cat) => {
                let _ = write!(line, "{} [{}]", rec.name, cat);
            }
            None => line.push_str(&rec.name),
        }
        if include_origin {
            if let Some(origin) = &rec.origin {
                let origin = trim_token(origin, 80);
                if colors_enabled() {
                    let _ = write!(line, " {}", format!("[origin: {}]", origin).dimmed());
                } else {
                    let _ = write!(line, " [origin: {}]", origin);
                }
            }
        }
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, cat: Option<VulnCategory>) -> ParameterRecord {
        ParameterRecord {
            name: name.to_string(),
            origin: Some("https://a.test/".to_string()),
            confidence: Confidence::High,
            is_suspicious: cat.is_some(),
            suspicious_type: cat,
        }
    }

    #[test]
    fn txt_tags_are_optional() {
        let records = vec![rec("q", Some(VulnCategory::Xss)), rec("plain", None)];
        assert_eq!(render_txt(&records, false, false), "q\nplain\n");
        assert_eq!(
            render_txt(&records, true, true),
            "q [origin: https://a.test/] [suspicious: XSS]\nplain [origin: https://a.test/]\n"
        );
    }

    #[test]
    fn csv_has_fixed_header() {
        let out = render_csv(&[rec("id", Some(VulnCategory::Sqli))]).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("Parameter,Origin,Confidence,Is_Suspicious,Suspicious_Type"));
        assert_eq!(lines.next(), Some("id,https://a.test/,high,true,SQLI"));
    }

    #[test]
    fn json_records() {
        let out = render_json(&[rec("next", Some(VulnCategory::OpenRedirect))]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["name"], "next");
        assert_eq!(value[0]["confidence"], "high");
        assert_eq!(value[0]["suspicious_type"], "OPENREDIRECT");
        assert_eq!(value[0]["is_suspicious"], true);
    }

    #[test]
    fn sidecar_next_to_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.csv");
        let options = ExportOptions {
            format: ExportFormat::Csv,
            report_sus: true,
            ..ExportOptions::default()
        };
        let records = [rec("id", Some(VulnCategory::Sqli)), rec("plain", None)];
        let side = write_export(&path, &records, &options).unwrap().unwrap();
        assert_eq!(side, dir.path().join("params_suspicious.txt"));
        assert_eq!(fs::read_to_string(side).unwrap(), "id [SQLI]\n");
        assert!(fs::read_to_string(path).unwrap().starts_with("Parameter,"));
    }
}
