//! Static preset registry

/// Preset used when the requested name is unknown
pub const DEFAULT_PRESET: &str = "default";

/// Every preset name the catalog knows
pub const PRESET_NAMES: &[&str] = &["default", "minimal", "seo", "headers", "parse"];

const DEFAULT: &[&str] = &["response.url", "depth"];

const MINIMAL: &[&str] = &["response.url"];

const SEO: &[&str] = &[
    "response.url",
    "result.mixed_content_url",
    "result.canonical",
    "result.is_canonical",
    "previousUrl",
    "depth",
    "response.status",
    "result.request_time",
    "result.title",
    "result.h1",
    "result.description",
    "result.keywords",
    "result.og_title",
    "result.og_image",
    "result.schema_types",
    "result.h1_count",
    "result.h2_count",
    "result.h3_count",
    "result.h4_count",
    "result.images",
    "result.images_without_alt",
    "result.images_alt_empty",
    "result.images_outer",
    "result.links",
    "result.links_inner",
    "result.links_outer",
    "result.text_ratio_percent",
    "result.dom_size",
    "result.html_size",
];

const HEADERS: &[&str] = &[
    "response.url",
    "depth",
    "response.headers.content-type",
    "response.headers.x-bitrix-composite",
    "response.headers.x-page-speed",
    "response.headers.x-cached-by",
    "response.headers.x-drupal-cache",
];

const PARSE: &[&str] = &[
    "response.url",
    "result.title",
    "result.h1",
    "result.description",
    "result.keywords",
];

/// Look up the field paths of a named preset
pub fn preset_fields(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "default" => Some(DEFAULT),
        "minimal" => Some(MINIMAL),
        "seo" => Some(SEO),
        "headers" => Some(HEADERS),
        "parse" => Some(PARSE),
        _ => None,
    }
}
