/// Where things live on a quote page. Each page redesign gets a new
/// version so a layout change surfaces as extraction errors instead of
/// shifted columns.
#[derive(Debug, PartialEq, Eq)]
pub struct QuoteLayout {
    pub version: &'static str,
    /// The label/value snapshot table.
    pub metrics_region: &'static str,
    /// Label and value cells inside the metrics region, in document order.
    pub cell: &'static str,
    pub title_region: &'static str,
    /// The id is the `title_index`-th match of `title_item` in the title region.
    pub title_item: &'static str,
    pub title_index: usize,
}

pub const FINVIZ_2017: QuoteLayout = QuoteLayout {
    version: "finviz-2017",
    metrics_region: "table.snapshot-table2",
    cell: "td",
    title_region: "table.fullview-title",
    title_item: "tr",
    title_index: 1,
};

pub const FINVIZ_2023: QuoteLayout = QuoteLayout {
    version: "finviz-2023",
    metrics_region: "table.snapshot-table2",
    cell: "td",
    title_region: "div.quote-header",
    title_item: "h1",
    title_index: 0,
};

pub const LAYOUTS: &[&QuoteLayout] = &[&FINVIZ_2017, &FINVIZ_2023];

pub fn by_version(version: &str) -> Option<&'static QuoteLayout> {
    LAYOUTS.iter().copied().find(|l| l.version == version)
}

pub fn versions() -> Vec<&'static str> {
    LAYOUTS.iter().map(|l| l.version).collect()
}
