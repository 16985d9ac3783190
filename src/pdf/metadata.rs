//! PDF page counting

use std::path::Path;

use lopdf::Document;

use crate::error::{Error, Result};

/// Count pages by reading the Count field from the Pages dictionary
///
/// This is more reliable than get_pages() for documents with nested page
/// trees, since Count on the root node covers the whole tree.
fn count_pages_from_catalog(doc: &Document) -> Result<usize> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .map_err(|_| Error::General("No Root in trailer".to_string()))?
        .as_reference()
        .map_err(|_| Error::General("Root is not a reference".to_string()))?;

    let pages_id = doc
        .get_object(catalog_id)?
        .as_dict()?
        .get(b"Pages")
        .map_err(|_| Error::General("No Pages in catalog".to_string()))?
        .as_reference()
        .map_err(|_| Error::General("Pages is not a reference".to_string()))?;

    let count = doc
        .get_object(pages_id)?
        .as_dict()?
        .get(b"Count")
        .map_err(|_| Error::General("No Count in Pages".to_string()))?
        .as_i64()
        .map_err(|_| Error::General("Count is not an integer".to_string()))?;

    Ok(count as usize)
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let page_count = count_pages_from_catalog(&doc)?;

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_pages_nonexistent_file() {
        let result = count_pages(Path::new("nonexistent.pdf"));
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), Error::FileNotFound(_)));
    }

    // Counting against real documents is covered in tests/integration.rs
}
