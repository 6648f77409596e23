use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn read(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| Error::open(path, e))?;
        Self::from_reader(f).map_err(|reason| Error::open(path, reason))
    }

    fn from_reader<R: Read + Seek>(reader: R) -> std::result::Result<Self, String> {
        let mut zip = ZipArchive::new(reader).map_err(|e| format!("read zip: {e}"))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(|e| format!("zip entry {i}: {e}"))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| format!("read zip entry {}: {e}", file.name()))?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Writes every entry in its original order, substituting `replacements` by name.
    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        let f = File::create(output_path).map_err(|e| Error::save(output_path, e))?;
        let mut zout = ZipWriter::new(f);
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .map_err(|e| {
                        Error::save(output_path, format!("add zip dir {}: {e}", ent.name))
                    })?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .map_err(|e| {
                        Error::save(output_path, format!("start zip file {}: {e}", ent.name))
                    })?;
                zout.write_all(data)
                    .map_err(|e| {
                        Error::save(output_path, format!("write zip file {}: {e}", ent.name))
                    })?;
            }
        }
        zout.finish()
            .map_err(|e| Error::save(output_path, format!("finish zip: {e}")))?;
        Ok(())
    }
}
