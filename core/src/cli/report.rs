use crate::extraction::tags::{keyword, parse_hex_key};
use crate::orchestrator::{FileListing, ReconcileReport, UploadOutcome};
use crate::types::{DicomAggregate, FileDisplayRecord, TagMap, TagValue};
use std::fmt;

/// Text report formatter for a full reconciliation
pub struct TextReport<'a> {
    report: &'a ReconcileReport,
}

impl<'a> TextReport<'a> {
    /// Creates a new text report
    pub fn new(report: &'a ReconcileReport) -> Self {
        Self { report }
    }
}

impl<'a> fmt::Display for TextReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DICOM Item Reconciliation")?;
        writeln!(f, "=========================")?;
        writeln!(f)?;
        writeln!(f, "Item:           {} ({})", self.report.item_name, self.report.item_id)?;
        writeln!(f, "Revision:       {}", self.report.revision)?;
        writeln!(f, "Files Scanned:  {}", self.report.files_scanned)?;
        writeln!(f, "DICOM Files:    {}", self.report.dicom_files)?;
        if !self.report.skipped.is_empty() {
            writeln!(f, "Skipped:        {}", self.report.skipped.join(", "))?;
        }
        writeln!(f)?;
        write!(f, "{}", AggregateReport::new(Some(&self.report.aggregate)))
    }
}

/// Text formatter for a stored aggregate
pub struct AggregateReport<'a> {
    aggregate: Option<&'a DicomAggregate>,
}

impl<'a> AggregateReport<'a> {
    pub fn new(aggregate: Option<&'a DicomAggregate>) -> Self {
        Self { aggregate }
    }
}

impl<'a> fmt::Display for AggregateReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(aggregate) = self.aggregate else {
            return writeln!(f, "Item has not been reconciled");
        };

        writeln!(f, "Common Metadata")?;
        writeln!(f, "---------------")?;
        match &aggregate.meta {
            None => writeln!(f, "(no DICOM files)")?,
            Some(meta) if meta.is_empty() => writeln!(f, "(no common tags)")?,
            Some(meta) => write_tags(f, meta, "")?,
        }
        writeln!(f)?;

        writeln!(f, "Files")?;
        writeln!(f, "-----")?;
        for record in &aggregate.files {
            writeln!(f, "{}", RecordLine(record))?;
        }
        Ok(())
    }
}

/// Text formatter for file listings
pub struct ListingReport<'a> {
    listings: &'a [FileListing],
}

impl<'a> ListingReport<'a> {
    pub fn new(listings: &'a [FileListing]) -> Self {
        Self { listings }
    }
}

impl<'a> fmt::Display for ListingReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.listings.is_empty() {
            return writeln!(f, "No DICOM files");
        }
        for listing in self.listings {
            writeln!(f, "{}", RecordLine(&listing.record))?;
            write_tags(f, &listing.dicom, "    ")?;
        }
        Ok(())
    }
}

/// One line per uploaded file
pub struct UploadReport<'a> {
    name: &'a str,
    outcome: UploadOutcome,
}

impl<'a> UploadReport<'a> {
    pub fn new(name: &'a str, outcome: UploadOutcome) -> Self {
        Self { name, outcome }
    }
}

impl<'a> fmt::Display for UploadReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            UploadOutcome::NotDicom => write!(f, "{}: not DICOM", self.name),
            UploadOutcome::Initialized => write!(f, "{}: first DICOM file of item", self.name),
            UploadOutcome::Folded { removed_tags } => {
                write!(f, "{}: folded, {} tags no longer common", self.name, removed_tags)
            }
        }
    }
}

struct RecordLine<'a>(&'a FileDisplayRecord);

impl<'a> fmt::Display for RecordLine<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        write!(
            f,
            "{:<24} series={} instance={} slice={}",
            record.name,
            Field(record.series_number.as_ref()),
            Field(record.instance_number.as_ref()),
            Field(record.slice_location.as_ref()),
        )
    }
}

struct Field<'a>(Option<&'a TagValue>);

impl<'a> fmt::Display for Field<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{}", value),
            None => f.write_str("-"),
        }
    }
}

fn write_tags(f: &mut fmt::Formatter<'_>, tags: &TagMap, indent: &str) -> fmt::Result {
    // hex keys duplicate keywords; show them only for unnamed tags
    let width = tags.keys().map(str::len).max().unwrap_or(0);
    for (key, value) in tags.iter() {
        if key.starts_with('x') && has_keyword_twin(tags, key) {
            continue;
        }
        writeln!(f, "{}{:<width$}  {}", indent, key, value, width = width)?;
    }
    Ok(())
}

fn has_keyword_twin(tags: &TagMap, hex: &str) -> bool {
    parse_hex_key(hex)
        .and_then(keyword)
        .is_some_and(|name| tags.contains_key(name))
}
