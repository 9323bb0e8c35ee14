// List decoding: raw bytes of a downloaded list -> raw candidate strings.
// Nothing here normalizes; the reconciler does that.

use crate::errors::{BlocklistError, Result};
use crate::normalization::candidate_from_line;
use flate2::read::GzDecoder;
use log::{debug, warn};
use serde_json::Value;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    TarGz,
    Json,
    Yaml,
    Text,
}

impl ListFormat {
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ListFormat::TarGz
        } else if lower.ends_with(".json") {
            ListFormat::Json
        } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            ListFormat::Yaml
        } else {
            ListFormat::Text
        }
    }
}

/// Decodes `bytes` according to `format`. `pointer` (RFC 6901) narrows JSON and
/// YAML documents to a subtree before string leaves are collected.
pub fn decode(format: ListFormat, bytes: &[u8], pointer: Option<&str>) -> Result<Vec<String>> {
    match format {
        ListFormat::TarGz => decode_tar_gz(bytes, pointer),
        ListFormat::Json => decode_json(bytes, pointer),
        ListFormat::Yaml => decode_yaml(bytes, pointer),
        ListFormat::Text => Ok(decode_text(bytes)),
    }
}

pub fn decode_text(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter_map(candidate_from_line)
        .map(str::to_string)
        .collect()
}

pub fn decode_json(bytes: &[u8], pointer: Option<&str>) -> Result<Vec<String>> {
    let value: Value = serde_json::from_slice(bytes)?;
    leaves_at(&value, pointer)
}

pub fn decode_yaml(bytes: &[u8], pointer: Option<&str>) -> Result<Vec<String>> {
    let yaml: serde_yaml::Value = serde_yaml::from_slice(bytes)?;
    let value = serde_json::to_value(yaml)?;
    leaves_at(&value, pointer)
}

/// Decodes every regular member of a gzipped tarball by its own extension.
/// Blocking; run it on the blocking pool.
pub fn decode_tar_gz(bytes: &[u8], pointer: Option<&str>) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let member_format = ListFormat::from_file_name(&name);
        if member_format == ListFormat::TarGz {
            debug!("Skipping nested archive {}", name);
            continue;
        }
        let mut body = Vec::new();
        entry.read_to_end(&mut body)?;
        match decode(member_format, &body, pointer) {
            Ok(candidates) => {
                debug!("Archive member {}: {} candidates", name, candidates.len());
                out.extend(candidates);
            }
            Err(e) => warn!("⚠️ Skipping archive member {}: {}", name, e),
        }
    }
    Ok(out)
}

fn leaves_at(value: &Value, pointer: Option<&str>) -> Result<Vec<String>> {
    let root = match pointer {
        Some(p) => value
            .pointer(p)
            .ok_or_else(|| BlocklistError::Decode(format!("pointer `{}` matches nothing", p)))?,
        None => value,
    };
    let mut out = Vec::new();
    string_leaves(root, &mut out);
    Ok(out)
}

/// Collects every string leaf of `value`, depth first. Object keys are ignored.
pub fn string_leaves(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| string_leaves(v, out)),
        Value::Object(map) => map.values().for_each(|v| string_leaves(v, out)),
        _ => {}
    }
}
