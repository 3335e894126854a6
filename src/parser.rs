//! Pull-based reader for MediaWiki XML exports.
//!
//! The reader walks quick-xml events and hands out one [`DumpItem`] at a time.
//! Nothing but the page currently being assembled is kept: the event buffer is
//! cleared before every read and each page is moved out as soon as its closing
//! tag is seen, so memory is bounded by the largest single page rather than by
//! the size of the export.

use crate::config::{MEDIAWIKI_XMLNS, READ_BUFFER_SIZE};
use crate::error::{ensure_input, ExtractError};
use crate::models::{DumpItem, Namespace, RawPage};
use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    MediaWiki,
    SiteInfo,
    Namespaces,
    Namespace,
    Page,
    Title,
    Id,
    Revision,
    Text,
    Other,
}

impl Tag {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"mediawiki" => Tag::MediaWiki,
            b"siteinfo" => Tag::SiteInfo,
            b"namespaces" => Tag::Namespaces,
            b"namespace" => Tag::Namespace,
            b"page" => Tag::Page,
            b"title" => Tag::Title,
            b"id" => Tag::Id,
            b"revision" => Tag::Revision,
            b"text" => Tag::Text,
            _ => Tag::Other,
        }
    }
}

/// Which field the character data currently being read belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Id,
    Text,
    NamespaceName,
}

#[derive(Default)]
struct ParseState {
    path: Vec<Tag>,
    xmlns: Option<String>,
    namespaces: Option<Vec<Namespace>>,
    pending_namespace: Option<Namespace>,
    page: Option<RawPage>,
    capture: Option<Field>,
    chars: String,
}

impl ParseState {
    fn parent(&self) -> Option<Tag> {
        self.path.last().copied()
    }

    fn grandparent(&self) -> Option<Tag> {
        self.path.len().checked_sub(2).map(|i| self.path[i])
    }

    /// Decides what an opening (or self-closing) tag means in the current context.
    fn open(&mut self, e: &BytesStart, position: u64) -> Result<Tag> {
        let tag = Tag::from_name(e.local_name().as_ref());

        match (self.parent(), tag) {
            (None, Tag::MediaWiki) => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"xmlns" {
                        self.xmlns = Some(attr.unescape_value()?.into_owned());
                    }
                }
            }
            (Some(Tag::SiteInfo), Tag::Namespaces) => {
                self.namespaces = Some(Vec::new());
            }
            (Some(Tag::Namespaces), Tag::Namespace) => {
                self.pending_namespace = Some(Namespace {
                    attributes: read_attributes(e)?,
                    name: String::new(),
                });
                self.begin(Field::NamespaceName);
            }
            (Some(Tag::MediaWiki), Tag::Page) => {
                self.page = Some(RawPage {
                    position,
                    ..RawPage::default()
                });
            }
            (Some(Tag::Page), Tag::Title) => self.begin_if_unset(Field::Title),
            (Some(Tag::Page), Tag::Id) => self.begin_if_unset(Field::Id),
            (Some(Tag::Revision), Tag::Text) if self.grandparent() == Some(Tag::Page) => {
                self.begin_if_unset(Field::Text)
            }
            _ => {}
        }
        Ok(tag)
    }

    fn begin(&mut self, field: Field) {
        self.capture = Some(field);
        self.chars.clear();
    }

    /// Only the first occurrence of a field counts (e.g. the first revision's text).
    fn begin_if_unset(&mut self, field: Field) {
        let Some(page) = &self.page else {
            return;
        };
        let unset = match field {
            Field::Title => page.title.is_none(),
            Field::Id => page.id.is_none(),
            Field::Text => page.text.is_none(),
            Field::NamespaceName => false,
        };
        if unset {
            self.begin(field);
        }
    }

    fn push_chars(&mut self, s: &str) {
        if self.capture.is_some() {
            self.chars.push_str(s);
        }
    }

    /// Handles the end of `tag`, returning an item once a page or the namespace
    /// block is complete.
    fn close(&mut self, tag: Tag) -> Option<DumpItem> {
        if let Some(field) = self.capture {
            let matches = matches!(
                (field, tag),
                (Field::Title, Tag::Title)
                    | (Field::Id, Tag::Id)
                    | (Field::Text, Tag::Text)
                    | (Field::NamespaceName, Tag::Namespace)
            );
            if matches {
                self.finish(field);
            }
        }

        match tag {
            Tag::Namespace => {
                if let (Some(ns), Some(list)) =
                    (self.pending_namespace.take(), self.namespaces.as_mut())
                {
                    list.push(ns);
                }
                None
            }
            Tag::Namespaces => self.namespaces.take().map(DumpItem::Namespaces),
            Tag::Page if self.parent() == Some(Tag::MediaWiki) => {
                self.page.take().map(DumpItem::Page)
            }
            _ => None,
        }
    }

    fn finish(&mut self, field: Field) {
        self.capture = None;
        let value = std::mem::take(&mut self.chars);
        match field {
            Field::NamespaceName => {
                if let Some(ns) = self.pending_namespace.as_mut() {
                    ns.name = value;
                }
            }
            Field::Title | Field::Id | Field::Text => {
                if let Some(page) = self.page.as_mut() {
                    let slot = match field {
                        Field::Title => &mut page.title,
                        Field::Id => &mut page.id,
                        _ => &mut page.text,
                    };
                    *slot = Some(value);
                }
            }
        }
    }
}

fn read_attributes(e: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

pub struct DumpReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: ParseState,
    done: bool,
}

impl DumpReader<BufReader<Box<dyn Read>>> {
    /// Opens an export on disk; `.bz2` files (including multistream dumps) are
    /// decompressed on the fly.
    pub fn open(path: &Path) -> Result<Self> {
        ensure_input(path)?;
        let file = File::open(path)
            .with_context(|| format!("Failed to open content export: {}", path.display()))?;
        let is_bz2 = path.extension().is_some_and(|ext| ext == "bz2");
        let inner: Box<dyn Read> = if is_bz2 {
            Box::new(MultiBzDecoder::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)))
        } else {
            Box::new(file)
        };
        Ok(Self::from_reader(BufReader::with_capacity(READ_BUFFER_SIZE, inner)))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn from_reader(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::new(),
            state: ParseState::default(),
            done: false,
        }
    }

    /// Root namespace of the export, once the `<mediawiki>` tag has been read.
    pub fn xmlns(&self) -> &str {
        self.state.xmlns.as_deref().unwrap_or(MEDIAWIKI_XMLNS)
    }

    /// Capacity of the event scratch buffer; grows only to the largest single event.
    pub fn scratch_capacity(&self) -> usize {
        self.buf.capacity() + self.state.chars.capacity()
    }

    /// Number of pages held by the reader right now (0 or 1).
    pub fn pages_in_flight(&self) -> usize {
        usize::from(self.state.page.is_some())
    }

    pub fn next_item(&mut self) -> Result<Option<DumpItem>> {
        if self.done {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            let position = self.reader.buffer_position() as u64;
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| format!("XML error near byte {}", position))?;

            match event {
                Event::Start(e) => {
                    let tag = self.state.open(&e, position)?;
                    self.state.path.push(tag);
                }
                Event::Empty(e) => {
                    let tag = self.state.open(&e, position)?;
                    self.state.path.push(tag);
                    self.state.path.pop();
                    if let Some(item) = self.state.close(tag) {
                        return Ok(Some(item));
                    }
                }
                Event::End(_) => {
                    let Some(tag) = self.state.path.pop() else {
                        continue;
                    };
                    if let Some(item) = self.state.close(tag) {
                        return Ok(Some(item));
                    }
                }
                Event::Text(e) => {
                    if self.state.capture.is_some() {
                        let text = e
                            .unescape()
                            .with_context(|| format!("Bad character data near byte {}", position))?;
                        self.state.push_chars(&text);
                    }
                }
                Event::CData(e) => {
                    if self.state.capture.is_some() {
                        let raw = e.into_inner();
                        self.state.push_chars(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::Eof => {
                    self.done = true;
                    if let Some(page) = self.state.page.take() {
                        return Err(ExtractError::malformed_page(
                            page.position,
                            "export ended inside a page",
                        )
                        .into());
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<DumpItem>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(xml: &str) -> Vec<DumpItem> {
        DumpReader::from_reader(xml.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn pages(xml: &str) -> Vec<RawPage> {
        items(xml)
            .into_iter()
            .filter_map(|item| match item {
                DumpItem::Page(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reads_page_level_id_not_revision_id() {
        let xml = r#"<mediawiki><page><title>A</title><ns>0</ns><id>12</id>
            <revision><id>999</id><text>body</text></revision></page></mediawiki>"#;
        let pages = pages(xml);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id.as_deref(), Some("12"));
        assert_eq!(pages[0].title.as_deref(), Some("A"));
        assert_eq!(pages[0].text.as_deref(), Some("body"));
    }

    #[test]
    fn unescapes_entities_in_text() {
        let xml = "<mediawiki><page><title>A &amp; B</title><id>1</id>\
                   <revision><text>x &lt; y &amp;#160;</text></revision></page></mediawiki>";
        let page = &pages(xml)[0];
        assert_eq!(page.title.as_deref(), Some("A & B"));
        assert_eq!(page.text.as_deref(), Some("x < y &#160;"));
    }

    #[test]
    fn empty_text_element_is_present_but_empty() {
        let xml = r#"<mediawiki><page><title>A</title><id>1</id>
            <revision><text bytes="0" /></revision></page></mediawiki>"#;
        assert_eq!(pages(xml)[0].text.as_deref(), Some(""));
    }

    #[test]
    fn missing_fields_stay_none() {
        let xml = "<mediawiki><page><title>A</title></page></mediawiki>";
        let page = &pages(xml)[0];
        assert!(page.id.is_none());
        assert!(page.text.is_none());
    }

    #[test]
    fn namespaces_block_is_collected() {
        let xml = r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.11/">
            <siteinfo><sitename>Wikipedia</sitename><namespaces>
              <namespace key="-2" case="first-letter">Media</namespace>
              <namespace key="0" case="first-letter" />
              <namespace key="14" case="first-letter">Category</namespace>
            </namespaces></siteinfo></mediawiki>"#;
        let mut reader = DumpReader::from_reader(xml.as_bytes());
        let item = reader.next_item().unwrap().unwrap();
        let DumpItem::Namespaces(namespaces) = item else {
            panic!("expected namespaces");
        };
        assert_eq!(namespaces.len(), 3);
        assert_eq!(namespaces[0].name, "Media");
        assert_eq!(
            namespaces[0].attributes,
            vec![
                ("key".to_string(), "-2".to_string()),
                ("case".to_string(), "first-letter".to_string())
            ]
        );
        assert_eq!(namespaces[1].name, "");
        assert_eq!(namespaces[2].name, "Category");
        assert_eq!(reader.xmlns(), "http://www.mediawiki.org/xml/export-0.11/");
        assert!(reader.next_item().unwrap().is_none());
    }

    #[test]
    fn default_xmlns_when_absent() {
        let reader = DumpReader::from_reader("<mediawiki/>".as_bytes());
        assert_eq!(reader.xmlns(), MEDIAWIKI_XMLNS);
    }

    #[test]
    fn truncated_page_is_fatal() {
        let xml = "<mediawiki><page><title>A</title><id>1</id>";
        let mut reader = DumpReader::from_reader(xml.as_bytes());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::MalformedPage { .. })
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn pages_are_released_after_emission() {
        let xml = "<mediawiki><page><title>A</title><id>1</id><revision><text>a</text></revision></page>\
                   <page><title>B</title><id>2</id><revision><text>b</text></revision></page></mediawiki>";
        let mut reader = DumpReader::from_reader(xml.as_bytes());
        while let Some(item) = reader.next_item().unwrap() {
            assert!(matches!(item, DumpItem::Page(_)));
            assert_eq!(reader.pages_in_flight(), 0);
        }
    }

    #[test]
    fn duplicate_ids_are_both_emitted() {
        let xml = "<mediawiki>\
                   <page><title>A</title><id>1</id><revision><text>a</text></revision></page>\
                   <page><title>A2</title><id>1</id><revision><text>b</text></revision></page>\
                   </mediawiki>";
        assert_eq!(pages(xml).len(), 2);
    }
}
