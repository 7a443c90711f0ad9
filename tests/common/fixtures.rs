//! Test fixtures: repository indexes, chart archives and icons

use flate2::Compression;
use flate2::write::GzEncoder;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{Map, Value, json};
use std::io::Cursor;

pub const SVG_ICON: &str =
    r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10"/></svg>"#;

pub const README: &str = "# WordPress\n\nBlogging platform.\n";
pub const VALUES: &str = "image: wordpress\nreplicas: 1\n";
pub const SCHEMA: &str = r#"{"type": "object"}"#;

/// One version entry of an index, digest derived from name and version.
pub fn chart_entry(name: &str, version: &str, created: &str, url: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "name": name,
        "version": version,
        "appVersion": format!("{version}-app"),
        "created": created,
        "description": format!("{name} chart"),
        "home": format!("https://{name}.example.com"),
        "keywords": [name],
        "maintainers": [{"name": "Jane Doe", "email": "jane@example.com"}],
        "sources": [format!("https://github.com/example/{name}")],
        "digest": digest_for(name, version),
        "urls": [url],
    })
}

pub fn digest_for(name: &str, version: &str) -> String {
    format!("sha256-{name}-{version}")
}

pub fn with_icon(mut entry: Value, icon: &str) -> Value {
    entry["icon"] = json!(icon);
    entry
}

pub fn deprecated(mut entry: Value) -> Value {
    entry["deprecated"] = json!(true);
    entry
}

pub fn with_digest(mut entry: Value, digest: &str) -> Value {
    entry["digest"] = json!(digest);
    entry
}

/// Serializes entries into an `index.yaml`, grouping them by chart name and
/// keeping their order within a chart.
pub fn index_yaml(entries: Vec<Value>) -> String {
    let mut grouped: Map<String, Value> = Map::new();
    for entry in entries {
        let name = entry["name"].as_str().unwrap().to_string();
        grouped
            .entry(name)
            .or_insert_with(|| Value::Array(vec![]))
            .as_array_mut()
            .unwrap()
            .push(entry);
    }

    serde_yaml::to_string(&json!({
        "apiVersion": "v1",
        "entries": grouped,
        "generated": "2024-01-01T00:00:00Z",
    }))
    .unwrap()
}

/// gzip-compressed tar archive with the given `(path, content)` entries.
pub fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Archive of a chart with README, values and schema.
pub fn chart_tarball(name: &str) -> Vec<u8> {
    let chart_yaml = format!("{name}/Chart.yaml");
    let readme = format!("{name}/README.md");
    let values = format!("{name}/values.yaml");
    let schema = format!("{name}/values.schema.json");
    tarball(&[
        (chart_yaml.as_str(), "name: chart\n"),
        (readme.as_str(), README),
        (values.as_str(), VALUES),
        (schema.as_str(), SCHEMA),
    ])
}

pub fn png_icon(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}
