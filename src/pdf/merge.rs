//! Signature page merging using lopdf
//!
//! Two arrangements are supported: `merge` overlays the source document's
//! last page content onto the signature page, `append` adds the signature
//! as a new trailing page. Only the first page of the signature PDF is used.

use std::path::PathBuf;

use lopdf::content::Content;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// Which arrangement to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMode {
    /// Overlay the source's last page content onto the signature page
    Merge,
    /// Add the signature page as a new trailing page
    Append,
}

/// Options for attaching a signature page to a PDF
#[derive(Debug, Clone)]
pub struct SignatureOptions {
    /// Source PDF file path; read-only input
    pub source_path: PathBuf,
    /// Signature PDF file path; only its first page is used
    pub signature_path: PathBuf,
    /// Output PDF file path
    pub output_path: PathBuf,
    /// Merge or append
    pub mode: SignatureMode,
}

/// Attach a signature page to a source PDF
///
/// In [`SignatureMode::Merge`], pages `[0, N-2]` of the source are copied
/// verbatim and the source's last page content is painted on top of the
/// signature page, which becomes the final page; the output has N pages.
/// In [`SignatureMode::Append`], all N source pages are copied and the
/// signature page is added after them; the output has N + 1 pages.
///
/// # Example
///
/// ```no_run
/// use merge_signature::pdf::{merge_signature, SignatureMode, SignatureOptions};
/// use std::path::PathBuf;
///
/// let options = SignatureOptions {
///     source_path: PathBuf::from("contract.pdf"),
///     signature_path: PathBuf::from("signature.pdf"),
///     output_path: PathBuf::from("signed.pdf"),
///     mode: SignatureMode::Merge,
/// };
///
/// merge_signature(&options).expect("Failed to attach signature page");
/// ```
pub fn merge_signature(options: &SignatureOptions) -> Result<()> {
    // Validate inputs before any output is created
    for path in [&options.source_path, &options.signature_path] {
        if !path.exists() {
            return Err(Error::FileNotFound(path.clone()));
        }
    }

    let mut source = Document::load(&options.source_path)?;
    let mut signature = Document::load(&options.signature_path)?;

    if source.get_pages().is_empty() {
        return Err(Error::EmptyPdf(options.source_path.clone()));
    }
    if signature.get_pages().is_empty() {
        return Err(Error::EmptyPdf(options.signature_path.clone()));
    }

    // Renumber into disjoint ID ranges so both object sets can share one
    // document without collisions
    source.renumber_objects_with(1);
    signature.renumber_objects_with(source.max_id + 1);
    let max_id = signature.max_id;

    // Page IDs must be collected after renumbering
    let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();
    let signature_page = signature
        .get_pages()
        .into_values()
        .next()
        .ok_or_else(|| Error::EmptyPdf(options.signature_path.clone()))?;

    let mut output = Document::with_version("1.5");
    output.objects.extend(source.objects);
    output.objects.extend(signature.objects);

    // new_object_id() hands out IDs above max_id; without this it would
    // collide with the objects we just pooled
    output.max_id = max_id;

    // The old Parent chains are still intact inside the pooled objects, so
    // inherited page attributes can be resolved now, before re-parenting
    for &page_id in source_pages.iter().chain([signature_page].iter()) {
        hoist_inherited_attributes(&mut output, page_id)?;
    }

    let page_ids = match options.mode {
        SignatureMode::Merge => {
            let (last, rest) = source_pages
                .split_last()
                .ok_or_else(|| Error::EmptyPdf(options.source_path.clone()))?;
            overlay_page(&mut output, signature_page, *last)?;

            let mut ids = rest.to_vec();
            ids.push(signature_page);
            ids
        }
        SignatureMode::Append => {
            let mut ids = source_pages;
            ids.push(signature_page);
            ids
        }
    };

    attach_page_tree(&mut output, &page_ids);

    output.compress();
    output.save(&options.output_path)?;

    Ok(())
}

/// Overlay one page's content on top of another
///
/// The base page keeps its dictionary (and therefore its page size); the
/// overlay page's content streams are appended after the base content so
/// they paint on top. The base content is bracketed in q/Q streams so its
/// graphics state cannot leak into the overlay content.
fn overlay_page(doc: &mut Document, base_id: ObjectId, overlay_id: ObjectId) -> Result<()> {
    let base_contents = page_content_refs(doc, base_id)?;
    let mut overlay_contents = page_content_refs(doc, overlay_id)?;

    let base_resources = page_resources(doc, base_id)?;
    let mut overlay_resources = page_resources(doc, overlay_id)?;

    // A resource name shared by both pages but bound to different objects
    // would make the overlay content pick up the base page's binding. Rename
    // such entries and rewrite the overlay content to match.
    let renames = rename_collisions(&base_resources, &mut overlay_resources);
    if !renames.is_empty() {
        overlay_contents = rewrite_content_names(doc, &overlay_contents, &renames)?;
    }

    let resources = merge_resources(base_resources, &overlay_resources);

    let push_state = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let pop_state = doc.add_object(Stream::new(Dictionary::new(), b"Q\n".to_vec()));

    let mut contents: Vec<Object> = Vec::new();
    contents.push(Object::Reference(push_state));
    contents.extend(base_contents.into_iter().map(Object::Reference));
    contents.push(Object::Reference(pop_state));
    contents.extend(overlay_contents.into_iter().map(Object::Reference));

    let page = doc.get_object_mut(base_id)?;
    if let Object::Dictionary(ref mut dict) = page {
        dict.set("Contents", Object::Array(contents));
        dict.set("Resources", Object::Dictionary(resources));
    }

    Ok(())
}

/// Collect a page's content stream references
fn page_content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>> {
    let page = doc.get_object(page_id)?.as_dict()?;

    let refs = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![*id],
        Ok(Object::Array(array)) => array
            .iter()
            .filter_map(|obj| obj.as_reference().ok())
            .collect(),
        _ => vec![],
    };

    Ok(refs)
}

/// Resolve a page's Resources dictionary, following inheritance
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    match lookup_inherited(doc, page_id, b"Resources")? {
        Some(Object::Reference(id)) => Ok(doc.get_object(id)?.as_dict()?.clone()),
        Some(Object::Dictionary(dict)) => Ok(dict),
        _ => Ok(Dictionary::new()),
    }
}

/// Union two resource dictionaries, category by category
///
/// Categories present in both (Font, XObject, ExtGState, ...) are merged at
/// the resource name level, with the overlay entry winning on a collision.
fn merge_resources(base: Dictionary, overlay: &Dictionary) -> Dictionary {
    let mut merged = base;

    for (category, value) in overlay.iter() {
        match (merged.get(category).ok().cloned(), value) {
            (Some(Object::Dictionary(mut existing)), Object::Dictionary(incoming)) => {
                for (name, entry) in incoming.iter() {
                    existing.set(name.clone(), entry.clone());
                }
                merged.set(category.clone(), Object::Dictionary(existing));
            }
            _ => {
                merged.set(category.clone(), value.clone());
            }
        }
    }

    merged
}

/// Rename overlay resource entries whose names collide with base entries
///
/// Returns the (old, new) name pairs; the overlay content streams must be
/// rewritten to use the new names. Entries that resolve to the same object
/// in both dictionaries are left alone.
fn rename_collisions(base: &Dictionary, overlay: &mut Dictionary) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut renames: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    let mut renamed = Dictionary::new();

    for (category, value) in overlay.iter() {
        let (Ok(Object::Dictionary(base_entries)), Object::Dictionary(entries)) =
            (base.get(category), value)
        else {
            renamed.set(category.clone(), value.clone());
            continue;
        };

        let mut new_entries = Dictionary::new();
        for (name, entry) in entries.iter() {
            if !collides(base_entries, name, entry) {
                new_entries.set(name.clone(), entry.clone());
                continue;
            }
            let fresh = fresh_name(name, base_entries, entries);
            renames.push((name.clone(), fresh.clone()));
            new_entries.set(fresh, entry.clone());
        }
        renamed.set(category.clone(), Object::Dictionary(new_entries));
    }

    *overlay = renamed;
    renames
}

/// A name collides when the base binds it to a different object
fn collides(base_entries: &Dictionary, name: &[u8], entry: &Object) -> bool {
    match base_entries.get(name) {
        Ok(existing) => match (existing.as_reference(), entry.as_reference()) {
            (Ok(a), Ok(b)) => a != b,
            _ => true,
        },
        Err(_) => false,
    }
}

/// Produce a name unused in either dictionary
fn fresh_name(name: &[u8], base_entries: &Dictionary, entries: &Dictionary) -> Vec<u8> {
    let mut n = 0u32;
    loop {
        let candidate = [name, format!("x{}", n).as_bytes()].concat();
        if base_entries.get(&candidate).is_err() && entries.get(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}

/// Rewrite name operands in content streams after resource renaming
///
/// The streams may be shared with other pages, so a rewritten copy is added
/// as a new object instead of editing them in place.
fn rewrite_content_names(
    doc: &mut Document,
    content_refs: &[ObjectId],
    renames: &[(Vec<u8>, Vec<u8>)],
) -> Result<Vec<ObjectId>> {
    let mut data = Vec::new();
    for &id in content_refs {
        if let Object::Stream(stream) = doc.get_object(id)? {
            let content = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            data.extend(content);
            data.push(b'\n');
        }
    }

    let mut content = Content::decode(&data)?;
    for operation in &mut content.operations {
        for operand in &mut operation.operands {
            if let Object::Name(ref mut name) = operand {
                if let Some((_, new)) = renames.iter().find(|(old, _)| old == name) {
                    *name = new.clone();
                }
            }
        }
    }

    let stream_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));
    Ok(vec![stream_id])
}

/// Keys a page may inherit from an ancestor Pages node
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy inheritable attributes down onto the page dictionary
///
/// Every page ends up under a brand new Pages node, so anything it inherited
/// from its old page tree has to be made explicit first.
fn hoist_inherited_attributes(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut hoisted: Vec<(&[u8], Object)> = Vec::new();

    {
        let page = doc.get_object(page_id)?.as_dict()?;
        for key in INHERITABLE_KEYS {
            if page.get(key).is_ok() {
                continue;
            }
            if let Some(value) = lookup_inherited(doc, page_id, key)? {
                hoisted.push((key, value));
            }
        }
    }

    if !hoisted.is_empty() {
        let page = doc.get_object_mut(page_id)?;
        if let Object::Dictionary(ref mut dict) = page {
            for (key, value) in hoisted {
                dict.set(key, value);
            }
        }
    }

    Ok(())
}

/// Page trees are shallow in practice; a chain longer than this is cyclic
const MAX_PARENT_DEPTH: usize = 64;

/// Look up a page attribute, walking up the Parent chain if absent
fn lookup_inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Result<Option<Object>> {
    let mut current = page_id;

    for _ in 0..MAX_PARENT_DEPTH {
        let dict = doc.get_object(current)?.as_dict()?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value.clone()));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(id)) => current = *id,
            _ => return Ok(None),
        }
    }

    Err(Error::General("Parent chain does not terminate".to_string()))
}

/// Build a fresh Pages node and Catalog over the given page list
fn attach_page_tree(doc: &mut Document, page_ids: &[ObjectId]) {
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => page_ids.len() as i64,
        "Kids" => kids,
    };

    let catalog_id = doc.new_object_id();
    let catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };

    doc.objects.insert(pages_id, Object::Dictionary(pages));
    doc.objects.insert(catalog_id, Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    // Re-parent every page under the new Pages node
    for &page_id in page_ids {
        if let Ok(page) = doc.get_object_mut(page_id) {
            if let Object::Dictionary(ref mut dict) = page {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_signature_options_creation() {
        let options = SignatureOptions {
            source_path: PathBuf::from("contract.pdf"),
            signature_path: PathBuf::from("signature.pdf"),
            output_path: PathBuf::from("signed.pdf"),
            mode: SignatureMode::Append,
        };

        assert_eq!(options.source_path, Path::new("contract.pdf"));
        assert_eq!(options.mode, SignatureMode::Append);
    }

    #[test]
    fn test_merge_resources_unions_categories() {
        let base = dictionary! {
            "Font" => dictionary! { "F1" => Object::Null },
        };
        let overlay = dictionary! {
            "Font" => dictionary! { "F2" => Object::Null },
            "XObject" => dictionary! { "Im1" => Object::Null },
        };

        let merged = merge_resources(base, &overlay);

        let fonts = merged
            .get(b"Font")
            .expect("Font category missing")
            .as_dict()
            .expect("Font category is not a dictionary");
        assert!(fonts.get(b"F1").is_ok());
        assert!(fonts.get(b"F2").is_ok());
        assert!(merged.get(b"XObject").is_ok());
    }

    #[test]
    fn test_merge_resources_overlay_wins_on_collision() {
        let base = dictionary! {
            "Font" => dictionary! { "F1" => Object::Integer(1) },
        };
        let overlay = dictionary! {
            "Font" => dictionary! { "F1" => Object::Integer(2) },
        };

        let merged = merge_resources(base, &overlay);

        let fonts = merged
            .get(b"Font")
            .expect("Font category missing")
            .as_dict()
            .expect("Font category is not a dictionary");
        assert_eq!(fonts.get(b"F1").and_then(|obj| obj.as_i64()).ok(), Some(2));
    }

    #[test]
    fn test_rename_collisions_frees_shared_names() {
        let base = dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference((1, 0)) },
        };
        let mut overlay = dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference((2, 0)) },
        };

        let renames = rename_collisions(&base, &mut overlay);

        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].0, b"F1".to_vec());

        let fonts = overlay
            .get(b"Font")
            .expect("Font category missing")
            .as_dict()
            .expect("Font category is not a dictionary");
        assert!(fonts.get(b"F1").is_err(), "colliding name should be gone");
        assert!(fonts.get(&renames[0].1).is_ok(), "renamed entry should exist");
    }

    #[test]
    fn test_rename_collisions_keeps_identical_bindings() {
        // Same name bound to the same object is not a collision
        let base = dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference((1, 0)) },
        };
        let mut overlay = dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference((1, 0)) },
        };

        let renames = rename_collisions(&base, &mut overlay);

        assert!(renames.is_empty());
        let fonts = overlay
            .get(b"Font")
            .expect("Font category missing")
            .as_dict()
            .expect("Font category is not a dictionary");
        assert!(fonts.get(b"F1").is_ok());
    }

    #[test]
    fn test_lookup_inherited_rejects_cyclic_parent_chain() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.new_object_id();
        let pages_id = doc.new_object_id();

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Parent" => page_id,
            }),
        );

        let result = lookup_inherited(&doc, page_id, b"MediaBox");
        assert!(result.is_err(), "cyclic Parent chain should error, not hang");
    }

    #[test]
    fn test_merge_nonexistent_source() {
        let options = SignatureOptions {
            source_path: PathBuf::from("no-such-contract.pdf"),
            signature_path: PathBuf::from("no-such-signature.pdf"),
            output_path: PathBuf::from("signed.pdf"),
            mode: SignatureMode::Merge,
        };

        let result = merge_signature(&options);
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    // Tests against real documents live in tests/integration.rs
}
