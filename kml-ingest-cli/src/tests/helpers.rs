//! Test helpers for composing source documents and layered overrides.

use super::*;
use std::io::{Cursor, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A harbour layer with one styled point and one unstyled line.
pub(super) const HARBOUR_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
  <Style id="river"><LineStyle><color>ffff0000</color><width>2</width></LineStyle></Style>
  <Folder><name>Harbour</name>
    <Placemark id="pier"><name>Pier</name><styleUrl>#river</styleUrl>
      <Point><coordinates>1,2</coordinates></Point></Placemark>
    <Placemark><name>Quay</name>
      <LineString><coordinates>0,0 1,1</coordinates></LineString></Placemark>
  </Folder>
</Document></kml>"#;

/// A packaged document whose icon is tinted yellow and whose description
/// links to a bundled image.
pub(super) const PACKAGED_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
  <Style id="marker"><IconStyle><color>ff00ffff</color>
    <Icon><href>files/pin.png</href></Icon></IconStyle></Style>
  <Placemark><name>Beacon</name><styleUrl>#marker</styleUrl>
    <description>&lt;img src="files/pin.png"&gt;</description>
    <Point><coordinates>3,4</coordinates></Point></Placemark>
</Document></kml>"#;

#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn output(&self) -> Utf8PathBuf {
        self.root.join("out")
    }

    pub(super) fn write(&self, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = self.root.join(name);
        kml_ingest_fs::write_file(&path, contents).expect("write fixture");
        path
    }

    /// Write a KMZ holding `doc.kml` and a small PNG at `files/pin.png`.
    pub(super) fn write_kmz(&self, name: &str, document: &str) -> Utf8PathBuf {
        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        archive.start_file("doc.kml", options).expect("entry");
        archive
            .write_all(document.as_bytes())
            .expect("entry contents");
        archive.start_file("files/pin.png", options).expect("entry");
        archive.write_all(&png(4, 4)).expect("entry contents");
        let bytes = archive.finish().expect("finish archive").into_inner();
        self.write(name, &bytes)
    }
}

pub(super) fn png(width: u32, height: u32) -> Vec<u8> {
    let mut encoded = Cursor::new(Vec::new());
    image::RgbaImage::from_pixel(width, height, image::Rgba([90, 90, 90, 255]))
        .write_to(&mut encoded, image::ImageFormat::Png)
        .expect("encode png");
    encoded.into_inner()
}

pub(super) fn config_for(source: Utf8PathBuf, output_dir: Utf8PathBuf) -> IngestConfig {
    IngestConfig {
        source,
        output_dir,
        name: None,
        collate: false,
        lenient: false,
        schema: None,
        resource_prefix: DEFAULT_RESOURCE_PREFIX.to_owned(),
    }
}

pub(super) fn read_lines(path: &Utf8Path) -> Vec<String> {
    let contents = kml_ingest_fs::read_file(path).expect("read artefact");
    String::from_utf8(contents)
        .expect("utf-8 artefact")
        .lines()
        .map(str::to_owned)
        .collect()
}

pub(super) fn read_text(path: &Utf8Path) -> String {
    String::from_utf8(kml_ingest_fs::read_file(path).expect("read artefact")).expect("utf-8")
}
