//! PDF merging
//!
//! Concatenates the pages of several documents in order. Each source is
//! renumbered into a shared object space, its page tree is replaced by one
//! flat `Pages` node, and attributes a page inherited from its old tree are
//! copied onto the page itself.

use std::collections::BTreeMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use super::ProcessingError;

/// Fewest documents a merge accepts
pub const MIN_MERGE_INPUTS: usize = 2;

/// Most documents a merge accepts
pub const MAX_MERGE_INPUTS: usize = 50;

/// Page attributes that may be inherited from ancestors in the page tree
const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Deepest page tree walked when resolving inherited attributes
const MAX_TREE_DEPTH: usize = 64;

/// Merge result
#[derive(Debug)]
pub struct MergedPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Merge PDF documents, given as raw bytes, in order
///
/// CPU bound; call from a blocking task.
pub fn merge_pdfs(inputs: &[Vec<u8>]) -> Result<MergedPdf, ProcessingError> {
    if inputs.len() < MIN_MERGE_INPUTS {
        return Err(ProcessingError::TooFewInputs(MIN_MERGE_INPUTS));
    }
    if inputs.len() > MAX_MERGE_INPUTS {
        return Err(ProcessingError::TooManyInputs(MAX_MERGE_INPUTS));
    }

    let mut merged = Document::with_version("1.5");
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut next_id = 1;

    for (index, data) in inputs.iter().enumerate() {
        let invalid = |reason: String| ProcessingError::InvalidPdf { index, reason };

        let mut doc = Document::load_mem(data).map_err(|e| invalid(e.to_string()))?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let mut pages = BTreeMap::new();
        for page_id in doc.get_pages().into_values() {
            let page = doc
                .get_dictionary(page_id)
                .map_err(|e| invalid(format!("page {:?}: {}", page_id, e)))?;
            pages.insert(page_id, with_inherited_attributes(&doc, page));
            page_ids.push(page_id);
        }

        for (id, object) in doc.objects {
            if pages.contains_key(&id) || is_tree_node(&object) {
                continue;
            }
            merged.objects.insert(id, object);
        }
        for (id, page) in pages {
            merged.objects.insert(id, Object::Dictionary(page));
        }
    }

    if page_ids.is_empty() {
        return Err(ProcessingError::InvalidPdf {
            index: 0,
            reason: "no pages to merge".to_string(),
        });
    }

    let pages_id: ObjectId = (next_id, 0);
    let catalog_id: ObjectId = (next_id + 1, 0);

    for id in &page_ids {
        if let Some(Object::Dictionary(page)) = merged.objects.get_mut(id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_ids.len() as i64),
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        }),
    );
    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = catalog_id.0;
    merged.compress();

    let mut bytes = Vec::new();
    merged
        .save_to(&mut bytes)
        .map_err(|e| ProcessingError::Io(std::io::Error::other(e.to_string())))?;

    Ok(MergedPdf {
        bytes,
        pages: page_ids.len(),
    })
}

/// Catalogs, page tree nodes and outlines are rebuilt or dropped
fn is_tree_node(object: &Object) -> bool {
    let Object::Dictionary(dict) = object else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog" | b"Pages" | b"Outlines" | b"Outline")
    )
}

/// Copy attributes the page inherits from its ancestors onto the page
fn with_inherited_attributes(doc: &Document, page: &Dictionary) -> Dictionary {
    let mut page = page.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(node_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    page
}
