use crate::artifacts::write_atomic;
use crate::config::PROGRESS_INTERVAL;
use crate::content::clean_page;
use crate::error::ExtractError;
use crate::models::{DumpItem, ExtractedPage, Namespace, RawPage};
use crate::parser::DumpReader;
use crate::stats::PipelineStats;
use anyhow::{Context, Result};
use bzip2::write::BzEncoder;
use bzip2::Compression;
use indicatif::ProgressBar;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use rustc_hash::FxHashSet;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, info};

/// Writes the filtered export: one `<mediawiki>` root wrapping the namespace
/// block and the selected pages.
pub struct DumpWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> DumpWriter<W> {
    pub fn begin(inner: W, xmlns: &str) -> Result<Self> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("mediawiki").with_attributes([("xmlns", xmlns)]),
        ))?;
        Ok(Self { writer })
    }

    pub fn write_namespaces(&mut self, namespaces: &[Namespace]) -> Result<()> {
        self.writer
            .write_event(Event::Start(BytesStart::new("siteinfo")))?;
        self.writer
            .write_event(Event::Start(BytesStart::new("namespaces")))?;
        for ns in namespaces {
            let mut element = BytesStart::new("namespace");
            for (key, value) in &ns.attributes {
                element.push_attribute((key.as_str(), value.as_str()));
            }
            if ns.name.is_empty() {
                self.writer.write_event(Event::Empty(element))?;
            } else {
                self.writer.write_event(Event::Start(element))?;
                self.writer
                    .write_event(Event::Text(BytesText::new(&ns.name)))?;
                self.writer
                    .write_event(Event::End(BytesEnd::new("namespace")))?;
            }
        }
        self.writer
            .write_event(Event::End(BytesEnd::new("namespaces")))?;
        self.writer
            .write_event(Event::End(BytesEnd::new("siteinfo")))?;
        Ok(())
    }

    pub fn write_page(&mut self, page: &ExtractedPage) -> Result<()> {
        let mut id = itoa::Buffer::new();
        self.writer.write_event(Event::Start(BytesStart::new("page")))?;
        self.writer
            .create_element("title")
            .write_text_content(BytesText::new(&page.title))?;
        self.writer
            .create_element("id")
            .write_text_content(BytesText::new(id.format(page.id)))?;
        self.writer
            .write_event(Event::Start(BytesStart::new("revision")))?;
        self.writer
            .create_element("text")
            .write_text_content(BytesText::new(&page.text))?;
        self.writer
            .write_event(Event::End(BytesEnd::new("revision")))?;
        self.writer.write_event(Event::End(BytesEnd::new("page")))?;
        Ok(())
    }

    /// Closes the root element and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer
            .write_event(Event::End(BytesEnd::new("mediawiki")))?;
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n")?;
        Ok(inner)
    }
}

/// Validates a page off the dump. A page without id, title or text means the
/// export is not shaped the way a one-pass read relies on, so this is fatal.
fn page_id(page: &RawPage) -> Result<u64, ExtractError> {
    let raw = page
        .id
        .as_deref()
        .ok_or_else(|| ExtractError::malformed_page(page.position, "page has no <id>"))?;
    if page.title.is_none() {
        return Err(ExtractError::malformed_page(
            page.position,
            format!("page {} has no <title>", raw),
        ));
    }
    if page.text.is_none() {
        return Err(ExtractError::malformed_page(
            page.position,
            format!("page {} has no revision <text>", raw),
        ));
    }
    raw.trim().parse::<u64>().map_err(|_| {
        ExtractError::malformed_page(page.position, format!("non-numeric page id '{}'", raw))
    })
}

/// Copies every page of `reader` whose id is in `targets`, cleaned, into `out`.
/// The namespace block is copied regardless of the filter.
pub fn filter_dump<R: BufRead, W: Write>(
    mut reader: DumpReader<R>,
    out: W,
    targets: &FxHashSet<u64>,
    stats: &PipelineStats,
) -> Result<W> {
    // The root namespace is known once the first item (or the end) has been read.
    let mut next = reader.next_item()?;
    let mut dump = DumpWriter::begin(out, reader.xmlns())?;
    let pb = ProgressBar::new_spinner();

    while let Some(item) = next {
        match item {
            DumpItem::Namespaces(namespaces) => {
                debug!(count = namespaces.len(), "Copying namespace block");
                dump.write_namespaces(&namespaces)?;
            }
            DumpItem::Page(page) => {
                stats.inc_pages_scanned();
                let id = page_id(&page)?;
                if targets.contains(&id) {
                    let title = page.title.as_deref().unwrap_or_default();
                    let text = page.text.as_deref().unwrap_or_default();
                    dump.write_page(&clean_page(id, title, text))?;
                    stats.inc_pages_extracted();
                }
                if stats.pages_scanned() % PROGRESS_INTERVAL == 0 {
                    pb.tick();
                }
            }
        }
        next = reader.next_item()?;
    }

    pb.finish_and_clear();
    dump.finish()
}

/// One forward pass over the content export at `dump_path`, writing the
/// selected pages as bzip2-compressed XML to `output_path`.
pub fn run_extraction(
    dump_path: &Path,
    output_path: &Path,
    targets: &FxHashSet<u64>,
    stats: &PipelineStats,
) -> Result<()> {
    let reader = DumpReader::open(dump_path)?;
    info!(
        input = %dump_path.display(),
        output = %output_path.display(),
        targets = targets.len(),
        "Starting extraction pass"
    );

    write_atomic(output_path, |out| {
        let encoder = BzEncoder::new(out, Compression::best());
        let encoder = filter_dump(reader, encoder, targets, stats)?;
        encoder.finish().context("Failed to finish bzip2 stream")?;
        Ok(())
    })?;

    info!(
        scanned = stats.pages_scanned(),
        extracted = stats.pages_extracted(),
        "Extraction pass complete"
    );
    Ok(())
}
