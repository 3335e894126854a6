/// Namespace code of ordinary articles in the link export
pub const ARTICLE_NAMESPACE: &str = "0";

/// Namespace code of category pages in the link export
pub const CATEGORY_NAMESPACE: &str = "14";

/// Column positions in the categorylinks/page join export
pub const COL_PAGE_ID: usize = 0;
pub const COL_NAMESPACE: usize = 1;
pub const COL_TITLE: usize = 2;
pub const COL_CATEGORY: usize = 15;

/// Rows shorter than this are malformed
pub const MIN_LINK_FIELDS: usize = COL_CATEGORY + 1;

/// Bytes read from the head of the link export to guess its CSV dialect
pub const SNIFF_SAMPLE_BYTES: usize = 1024;

/// Delimiters considered by the dialect sniffer, in order of preference
pub const DELIMITER_CANDIDATES: &[u8] = b",\t;|:";

/// Default MediaWiki export namespace used when the input root carries none
pub const MEDIAWIKI_XMLNS: &str = "http://www.mediawiki.org/xml/export-0.10/";

/// Bump when the on-disk layout of the category cache changes
pub const CACHE_VERSION: u32 = 1;

/// Progress update interval (tick every N rows or pages)
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Buffer sizes for the large sequential readers and writers
pub const READ_BUFFER_SIZE: usize = 256 * 1024;
pub const WRITE_BUFFER_SIZE: usize = 128 * 1024;
