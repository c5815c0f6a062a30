//! The zip-of-XML container.
//!
//! A [`Package`] is a `.vsdx` file extracted into a scratch directory owned
//! by a `tempfile::TempDir`, so every exit path (success, error, early
//! return) removes the scratch tree when the package is dropped. Saving
//! re-zips the scratch tree next to the destination and renames over it, so
//! a crash mid-write never corrupts a pre-existing output.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::xml::Element;

/// Part paths inside the container.
pub mod parts {
    pub const PAGE1: &str = "visio/pages/page1.xml";
    pub const PAGES: &str = "visio/pages/pages.xml";
    pub const PAGE1_RELS: &str = "visio/pages/_rels/page1.xml.rels";
    pub const MASTERS: &str = "visio/masters/masters.xml";
    pub const MASTERS_RELS: &str = "visio/masters/_rels/masters.xml.rels";
    pub const DOCUMENT: &str = "visio/document.xml";
    pub const CONTENT_TYPES: &str = "[Content_Types].xml";

    pub fn master_file(name: &str) -> String {
        format!("visio/masters/{name}")
    }
}

pub struct Package {
    scratch: TempDir,
    /// Entry names in original zip order; appended parts go to the end.
    entries: Vec<String>,
}

impl Package {
    /// Extract a `.vsdx` container into a fresh scratch directory.
    pub fn open(path: &Path) -> Result<Self> {
        let scratch = TempDir::new()?;
        let file = fs::File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let out_path = scratch.path().join(&name);
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            fs::write(&out_path, bytes)?;
            entries.push(name);
        }

        Ok(Self { scratch, entries })
    }

    pub fn has_part(&self, part: &str) -> bool {
        self.entries.iter().any(|e| e == part)
    }

    pub fn part_names(&self) -> &[String] {
        &self.entries
    }

    pub fn read_part(&self, part: &str) -> Result<Vec<u8>> {
        if !self.has_part(part) {
            return Err(Error::MissingPart {
                part: part.to_string(),
            });
        }
        Ok(fs::read(self.scratch.path().join(part))?)
    }

    pub fn read_part_str(&self, part: &str) -> Result<String> {
        let bytes = self.read_part(part)?;
        String::from_utf8(bytes).map_err(|e| Error::Xml {
            part: part.to_string(),
            message: format!("part is not UTF-8: {e}"),
        })
    }

    /// Parse a part into an owned XML tree.
    pub fn read_xml(&self, part: &str) -> Result<Element> {
        let text = self.read_part_str(part)?;
        Element::parse(&text).map_err(|e| Error::xml(part, e))
    }

    pub fn write_part(&mut self, part: &str, bytes: &[u8]) -> Result<()> {
        let out_path = self.scratch.path().join(part);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, bytes)?;
        if !self.has_part(part) {
            self.entries.push(part.to_string());
        }
        Ok(())
    }

    pub fn write_xml(&mut self, part: &str, element: &Element) -> Result<()> {
        self.write_part(part, element.to_xml_string().as_bytes())
    }

    /// Copy a part byte-for-byte from another package under a new name.
    pub fn copy_part_from(&mut self, source: &Package, from: &str, to: &str) -> Result<()> {
        let bytes = source.read_part(from)?;
        self.write_part(to, &bytes)
    }

    /// Re-zip the scratch tree and atomically rename over `dest`.
    pub fn save(&self, dest: &Path) -> Result<()> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let staging: PathBuf = match dest.file_name() {
            Some(name) => {
                let mut tmp = name.to_os_string();
                tmp.push(".tmp");
                dir.join(tmp)
            }
            None => dir.join("package.tmp"),
        };

        let result = self.zip_to(&staging).and_then(|()| {
            fs::rename(&staging, dest)?;
            Ok(())
        });
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result
    }

    fn zip_to(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        let mut writer = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            writer.start_file(entry.as_str(), options)?;
            let bytes = fs::read(self.scratch.path().join(entry))?;
            writer.write_all(&bytes)?;
        }
        writer.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("mini.vsdx");
        let file = fs::File::create(&path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.start_file(parts::CONTENT_TYPES, options).unwrap();
        writer
            .write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
            .unwrap();
        writer.start_file(parts::PAGE1, options).unwrap();
        writer
            .write_all(br#"<PageContents xmlns="http://schemas.microsoft.com/office/visio/2012/main"><Shapes/></PageContents>"#)
            .unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn open_read_write_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_fixture(dir.path());

        let mut pkg = Package::open(&src).unwrap();
        assert!(pkg.has_part(parts::PAGE1));
        assert!(!pkg.has_part(parts::MASTERS));

        let mut page = pkg.read_xml(parts::PAGE1).unwrap();
        page.set_attr("Edited", "1");
        pkg.write_xml(parts::PAGE1, &page).unwrap();

        let out = dir.path().join("out.vsdx");
        pkg.save(&out).unwrap();

        let reopened = Package::open(&out).unwrap();
        let page = reopened.read_xml(parts::PAGE1).unwrap();
        assert_eq!(page.attr("Edited"), Some("1"));
        // Entry order is preserved across the round trip.
        assert_eq!(reopened.part_names()[0], parts::CONTENT_TYPES);
    }

    #[test]
    fn missing_part_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_fixture(dir.path());
        let pkg = Package::open(&src).unwrap();
        match pkg.read_part(parts::MASTERS) {
            Err(Error::MissingPart { part }) => assert_eq!(part, parts::MASTERS),
            other => panic!("expected MissingPart, got {other:?}"),
        }
    }
}
