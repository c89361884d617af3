use super::normalize::normalize;
use super::tags::{hex_key, keyword, PIXEL_DATA};
use crate::error::{DicomItemError, Result};
use crate::store::BlobStore;
use crate::types::{FileDisplayRecord, FileDocument, ReconcileConfig, TagMap};
use dicom_core::header::Header;
use dicom_core::VR;
use dicom_dictionary_std::uids::{EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN};
use dicom_object::file::ReadPreamble;
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::{InMemDicomObject, OpenFileOptions};
use log::debug;
use std::io::{Cursor, Read};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const SNIFF_LEN: usize = PREAMBLE_LEN + MAGIC.len();

/// Lowest group a bare dataset may start with; below are command and meta
/// groups
const FIRST_DATASET_GROUP: u16 = 0x0008;

/// Tags and display record of one DICOM file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub tags: TagMap,
    pub record: FileDisplayRecord,
}

/// Reads the metadata of stored files
///
/// Parsing stops before pixel data and never consumes more than
/// `max_header_bytes` of a stream. Streams without the `DICM` magic code
/// are read as bare datasets. Anything that does not decode is reported as
/// `None`, never as an error.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    max_header_bytes: u64,
}

impl MetadataExtractor {
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            max_header_bytes: config.max_header_bytes,
        }
    }

    /// Extracts the tag map and display record of a stored file
    ///
    /// # Errors
    ///
    /// Returns an error only if the blob store cannot open the file.
    pub fn extract_file<B: BlobStore + ?Sized>(
        &self,
        blobs: &B,
        file: &FileDocument,
    ) -> Result<Option<FileMetadata>> {
        let tags = {
            let reader = blobs.open(file)?;
            self.extract_tags(reader)
        };

        Ok(tags.map(|tags| FileMetadata {
            record: FileDisplayRecord::from_tags(file, &tags),
            tags,
        }))
    }

    /// Extracts the tag map of a DICOM stream, or `None` if it is not DICOM
    pub fn extract_tags<R: Read>(&self, reader: R) -> Option<TagMap> {
        match self.read_object(reader) {
            Ok(obj) => tag_map_from_object(&obj),
            Err(e) => {
                debug!("Not a DICOM file: {}", e);
                None
            }
        }
    }

    /// Parses a stream up to its pixel data
    ///
    /// Only the first bytes are read ahead to find the magic code; the rest
    /// is pulled by the parser, which stops at the pixel data header. A
    /// stream without the magic code is parsed as a bare dataset.
    fn read_object<R: Read>(&self, reader: R) -> Result<InMemDicomObject> {
        let mut source = reader.take(self.max_header_bytes);
        let mut head = Vec::with_capacity(SNIFF_LEN);
        (&mut source).take(SNIFF_LEN as u64).read_to_end(&mut head)?;

        let prefix = match magic_offset(&head) {
            Some(offset) => {
                head = head.split_off(offset);
                Vec::new()
            }
            None => bare_dataset_header(&head)?,
        };

        let stream = Cursor::new(prefix)
            .chain(Cursor::new(head))
            .chain(&mut source);
        let obj = OpenFileOptions::new()
            .read_preamble(ReadPreamble::Never)
            .read_until(PIXEL_DATA)
            .from_reader(stream)?;

        if source.limit() == 0 {
            return Err(DicomItemError::DicomError(format!(
                "Header exceeds {} bytes",
                self.max_header_bytes
            )));
        }
        Ok(obj.into_inner())
    }
}

/// Offset of the `DICM` magic code, after the preamble or at the start
fn magic_offset(head: &[u8]) -> Option<usize> {
    if head.len() >= SNIFF_LEN && &head[PREAMBLE_LEN..SNIFF_LEN] == MAGIC {
        Some(PREAMBLE_LEN)
    } else if head.starts_with(MAGIC) {
        Some(0)
    } else {
        None
    }
}

/// Magic code and file meta group to put in front of a bare dataset
///
/// The transfer syntax is explicit VR little endian when the first element
/// carries a known VR, implicit VR little endian otherwise. The first
/// element must lie within `head`, which keeps arbitrary bytes from being
/// read as an element of enormous length.
fn bare_dataset_header(head: &[u8]) -> Result<Vec<u8>> {
    let not_dataset =
        |reason: &str| DicomItemError::DicomError(format!("No DICM magic code, {}", reason));
    if head.len() < 8 {
        return Err(not_dataset("stream too short"));
    }
    let group = u16::from_le_bytes([head[0], head[1]]);
    if group < FIRST_DATASET_GROUP {
        return Err(not_dataset("not a dataset group"));
    }

    let (transfer_syntax, header_len, value_len) = match VR::from_binary([head[4], head[5]]) {
        Some(vr) if has_long_length(vr) => (
            EXPLICIT_VR_LITTLE_ENDIAN,
            12,
            head.get(8..12)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
        Some(_) => (
            EXPLICIT_VR_LITTLE_ENDIAN,
            8,
            Some(u32::from(u16::from_le_bytes([head[6], head[7]]))),
        ),
        None => (
            IMPLICIT_VR_LITTLE_ENDIAN,
            8,
            Some(u32::from_le_bytes([head[4], head[5], head[6], head[7]])),
        ),
    };
    let fits = value_len.is_some_and(|len| header_len + u64::from(len) <= head.len() as u64);
    if !fits {
        return Err(not_dataset("first element out of bounds"));
    }

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid("")
        .media_storage_sop_instance_uid("")
        .build()
        .map_err(|e| DicomItemError::DicomError(e.to_string()))?;

    let mut header = MAGIC.to_vec();
    meta.write(&mut header)
        .map_err(|e| DicomItemError::DicomError(e.to_string()))?;
    Ok(header)
}

/// VRs with a 4-byte length field in explicit VR encoding
fn has_long_length(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB
            | VR::OD
            | VR::OF
            | VR::OL
            | VR::OV
            | VR::OW
            | VR::SQ
            | VR::SV
            | VR::UC
            | VR::UN
            | VR::UR
            | VR::UT
            | VR::UV
    )
}

/// Builds the tag map of a dataset
///
/// Standard tags appear under their keyword and their hex key; private and
/// unknown tags only under the hex key. A dataset with a single element and
/// no standard keyword is not considered DICOM.
pub fn tag_map_from_object(obj: &InMemDicomObject) -> Option<TagMap> {
    let mut tags = TagMap::new();
    let mut total = 0usize;
    let mut named = 0usize;

    for elem in obj.iter() {
        total += 1;
        let tag = elem.tag();
        let name = keyword(tag);
        if name.is_some() {
            named += 1;
        }

        let Some(value) = normalize(elem.vr(), elem.value()) else {
            continue;
        };
        if let Some(name) = name {
            tags.insert(name, value.clone());
        }
        tags.insert(hex_key(tag), value);
    }

    if named == 0 && total == 1 {
        debug!("Single unnamed element, not a DICOM file");
        return None;
    }
    Some(tags)
}
