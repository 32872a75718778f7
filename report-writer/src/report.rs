use chrono::{DateTime, Utc};
use harvest_core::{CommandKind, HarvestError, NormalizedRecord, Platform};

/// One run's output, assembled in memory before anything touches disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub platform: Platform,
    pub command: CommandKind,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    /// `**Key:** value` lines under the title.
    pub metadata: Vec<(String, String)>,
    /// Rows of the `| Metric | Count |` table; omitted when empty.
    pub summary: Vec<(String, u64)>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading: String,
    pub body: SectionBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Records {
        records: Vec<NormalizedRecord>,
        /// Rendered in place of an empty list.
        empty_note: String,
    },
    /// A view that could not be fetched; the rest of the report still renders.
    Failed { reason: String },
}

impl Report {
    pub fn new(platform: Platform, command: CommandKind, title: impl Into<String>) -> Self {
        Self {
            platform,
            command,
            title: title.into(),
            generated_at: Utc::now(),
            metadata: Vec::new(),
            summary: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.push((key.into(), value.to_string()));
        self
    }

    pub fn with_summary_row(mut self, label: impl Into<String>, count: u64) -> Self {
        self.summary.push((label.into(), count));
        self
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn push_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// True when at least one section failed.
    pub fn is_partial(&self) -> bool {
        self.failed_sections().next().is_some()
    }

    pub fn failed_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.is_failed())
    }

    pub fn record_count(&self) -> usize {
        self.sections.iter().map(Section::record_count).sum()
    }
}

impl Section {
    pub fn records(heading: impl Into<String>, records: Vec<NormalizedRecord>) -> Self {
        Self {
            heading: heading.into(),
            body: SectionBody::Records {
                records,
                empty_note: "No results found.".to_string(),
            },
        }
    }

    pub fn failed(heading: impl Into<String>, error: &HarvestError) -> Self {
        Self {
            heading: heading.into(),
            body: SectionBody::Failed {
                reason: error.to_string(),
            },
        }
    }

    /// Records on success, a failure annotation otherwise.
    pub fn from_result(
        heading: impl Into<String>,
        result: &Result<Vec<NormalizedRecord>, HarvestError>,
    ) -> Self {
        match result {
            Ok(records) => Self::records(heading, records.clone()),
            Err(error) => Self::failed(heading, error),
        }
    }

    pub fn with_empty_note(mut self, note: impl Into<String>) -> Self {
        if let SectionBody::Records { empty_note, .. } = &mut self.body {
            *empty_note = note.into();
        }
        self
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.body, SectionBody::Failed { .. })
    }

    pub fn record_count(&self) -> usize {
        match &self.body {
            SectionBody::Records { records, .. } => records.len(),
            _ => 0,
        }
    }
}
