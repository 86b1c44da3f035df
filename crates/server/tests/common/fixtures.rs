//! Test fixtures for building release bundles.

use bytes::Bytes;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// Builder for an in-memory bundle archive.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Default)]
pub struct BundleBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

#[allow(dead_code)]
impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary entry.
    pub fn entry(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), data.into()));
        self
    }

    /// Add `metadata.json` from a JSON value.
    pub fn manifest(self, manifest: serde_json::Value) -> Self {
        self.entry("metadata.json", manifest.to_string())
    }

    pub fn build(self) -> Bytes {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in &self.entries {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(data).unwrap();
        }
        Bytes::from(writer.finish().unwrap().into_inner())
    }
}

/// Launch bundle contents for a given tag, so releases are distinguishable.
#[allow(dead_code)]
pub fn launch_js(tag: &str) -> String {
    format!("console.log('{tag}');")
}

/// A two-platform bundle with one PNG asset per platform.
///
/// The iOS launch bundle is `bundles/ios-{tag}.js`, the Android one
/// `bundles/android-{tag}.js`, and both platforms share `assets/icon`.
#[allow(dead_code)]
pub fn sample_bundle(tag: &str) -> Bytes {
    let ios = format!("bundles/ios-{tag}.js");
    let android = format!("bundles/android-{tag}.js");
    BundleBuilder::new()
        .manifest(serde_json::json!({
            "version": 0,
            "bundler": "metro",
            "fileMetadata": {
                "ios": {
                    "bundle": ios,
                    "assets": [{ "path": "assets/icon", "ext": "png" }]
                },
                "android": {
                    "bundle": android,
                    "assets": [{ "path": "assets/icon", "ext": "png" }]
                }
            }
        }))
        .entry(&ios, launch_js(&format!("ios {tag}")))
        .entry(&android, launch_js(&format!("android {tag}")))
        .entry("assets/icon", png_bytes())
        .entry(
            "expoConfig.json",
            serde_json::json!({ "name": "demo", "slug": tag }).to_string(),
        )
        .build()
}

/// PNG signature followed by filler; enough for content checks.
#[allow(dead_code)]
pub fn png_bytes() -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    data.resize(264, 0xab);
    data
}
