//! DICOM fixtures built in memory

use crate::extraction::tags::{INSTANCE_NUMBER, SERIES_NUMBER, SLICE_LOCATION};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::uids::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::InMemDicomObject;

pub(crate) const MODALITY: Tag = Tag(0x0008, 0x0060);
pub(crate) const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
pub(crate) const STUDY_DESCRIPTION: Tag = Tag(0x0008, 0x1030);

/// Encodes a dataset with preamble, magic and file meta group
pub(crate) fn dicom_bytes(elements: &[(Tag, VR, &str)]) -> Vec<u8> {
    let mut obj = InMemDicomObject::new_empty();
    for (tag, vr, value) in elements {
        obj.put(DataElement::new(*tag, *vr, PrimitiveValue::from(*value)));
    }
    encode(obj)
}

pub(crate) fn encode(obj: InMemDicomObject) -> Vec<u8> {
    let file = obj.with_meta(test_meta(EXPLICIT_VR_LITTLE_ENDIAN)).unwrap();
    let mut buf = Vec::new();
    file.write_all(&mut buf).unwrap();
    buf
}

/// Encodes the dataset alone, without preamble, magic or file meta group
pub(crate) fn encode_bare(obj: InMemDicomObject, transfer_syntax: &str) -> Vec<u8> {
    let file = obj.with_meta(test_meta(transfer_syntax)).unwrap();
    let mut buf = Vec::new();
    file.write_dataset(&mut buf).unwrap();
    buf
}

fn test_meta(transfer_syntax: &str) -> FileMetaTableBuilder {
    FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.2")
        .media_storage_sop_instance_uid("1.2.3.4.5")
}

/// One slice of a CT series with common study tags
pub(crate) fn slice_bytes(series: &str, instance: &str, location: &str) -> Vec<u8> {
    dicom_bytes(&[
        (MODALITY, VR::CS, "CT"),
        (PATIENT_NAME, VR::PN, "Doe^John"),
        (STUDY_DESCRIPTION, VR::LO, "Chest"),
        (SERIES_NUMBER, VR::IS, series),
        (INSTANCE_NUMBER, VR::IS, instance),
        (SLICE_LOCATION, VR::DS, location),
    ])
}
