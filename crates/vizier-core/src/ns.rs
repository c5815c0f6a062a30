//! Namespace URIs and well-known type strings of the container format.

pub const VISIO_MAIN: &str = "http://schemas.microsoft.com/office/visio/2012/main";
pub const DOC_RELS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const PKG_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub const MASTER_REL_TYPE: &str =
    "http://schemas.microsoft.com/office/visio/2012/relationships/master";
pub const THEME_REL_TYPE: &str =
    "http://schemas.microsoft.com/office/visio/2012/relationships/theme";

pub const MASTER_CONTENT_TYPE: &str = "application/vnd.ms-visio.master+xml";
pub const THEME_CONTENT_TYPE: &str = "application/vnd.ms-visio.theme+xml";
