//! In-memory PDF reader.
//!
//! [`PdfReader`] owns the uploaded bytes, the merged cross-reference table
//! and a cache of loaded objects. It exposes just enough of the document
//! structure to find signature fields and check what they cover.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object;
use crate::signatures::EmbeddedSignature;
use crate::xref::{self, CrossRefTable, XRefEntry};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Nesting limit for reference chains and field trees.
const MAX_RECURSION_DEPTH: u32 = 64;

/// Parsed view over a complete PDF file.
pub struct PdfReader {
    data: Bytes,
    version: (u8, u8),
    xref: CrossRefTable,
    trailer: Dict,
    object_cache: RefCell<HashMap<ObjectRef, Object>>,
    resolving_stack: RefCell<HashSet<ObjectRef>>,
}

impl std::fmt::Debug for PdfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfReader")
            .field("len", &self.data.len())
            .field("version", &self.version)
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.object_cache.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Find `%PDF-x.y` within the first 1024 bytes and return the version.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let Some(pos) = window.windows(5).position(|w| w == b"%PDF-") else {
        let shown = String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned();
        return Err(Error::InvalidHeader(shown));
    };
    if pos > 0 {
        log::warn!("{} bytes of junk before the PDF header", pos);
    }

    let rest = &data[pos + 5..];
    let digit = |i: usize| rest.get(i).filter(|c| c.is_ascii_digit()).map(|c| c - b'0');
    match (digit(0), rest.get(1), digit(2)) {
        (Some(major), Some(b'.'), Some(minor)) => Ok((major, minor)),
        _ => Err(Error::InvalidHeader(
            String::from_utf8_lossy(&rest[..rest.len().min(8)]).into_owned(),
        )),
    }
}

impl PdfReader {
    /// Parse the header, cross-reference data and trailer of `data`.
    ///
    /// Encrypted documents are refused with [`Error::Encrypted`].
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        let data: Bytes = data.into();
        let version = parse_header(&data)?;

        let xref = match xref::find_xref_offset(&data)
            .and_then(|offset| xref::parse_xref_chain(&data, offset))
        {
            Ok(table) if table.trailer().is_some() => table,
            Ok(_) => xref::reconstruct(&data)?,
            Err(e) => {
                log::warn!("cross-reference data unusable ({}), scanning objects", e);
                xref::reconstruct(&data)?
            },
        };
        let trailer = xref
            .trailer()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("no trailer dictionary".to_string()))?;

        if trailer.contains_key("Encrypt") {
            return Err(Error::Encrypted);
        }

        log::debug!(
            "opened PDF {}.{}: {} bytes, {} xref entries",
            version.0,
            version.1,
            data.len(),
            xref.len()
        );

        Ok(Self {
            data,
            version,
            xref,
            trailer,
            object_cache: RefCell::new(HashMap::new()),
            resolving_stack: RefCell::new(HashSet::new()),
        })
    }

    /// Raw file bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Header version `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Newest trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Load an indirect object, from cache when possible.
    pub fn load_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.object_cache.borrow().get(&obj_ref) {
            return Ok(cached.clone());
        }
        if self.resolving_stack.borrow().len() as u32 >= MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
        }
        if !self.resolving_stack.borrow_mut().insert(obj_ref) {
            return Err(Error::CircularReference(obj_ref));
        }

        let result = match self.xref.get(obj_ref.id).copied() {
            Some(XRefEntry::Uncompressed { offset, .. }) => self.load_uncompressed(obj_ref, offset),
            Some(XRefEntry::Compressed { stream, index }) => {
                log::trace!("object {} is entry {} of object stream {}", obj_ref, index, stream);
                self.load_compressed(obj_ref, stream)
            },
            // Free and missing objects resolve to null
            Some(XRefEntry::Free) | None => Ok(Object::Null),
        };

        self.resolving_stack.borrow_mut().remove(&obj_ref);

        let object = result?;
        self.object_cache.borrow_mut().insert(obj_ref, object.clone());
        Ok(object)
    }

    fn load_uncompressed(&self, obj_ref: ObjectRef, offset: usize) -> Result<Object> {
        let input = self.data.get(offset..).ok_or(Error::ParseError {
            offset,
            reason: format!("offset of {} is past the end of the file", obj_ref),
        })?;
        let (_, (found, object)) = parse_indirect_object(input).map_err(|e| Error::ParseError {
            offset,
            reason: format!("object {}: {:?}", obj_ref, e),
        })?;
        if found.id != obj_ref.id {
            return Err(Error::ParseError {
                offset,
                reason: format!("expected object {}, found {}", obj_ref, found),
            });
        }
        Ok(object)
    }

    fn load_compressed(&self, obj_ref: ObjectRef, stream_id: u32) -> Result<Object> {
        let stream = self.load_object(ObjectRef::new(stream_id, 0))?;
        let mut objects = parse_object_stream(&stream)?;

        let wanted = objects.remove(&obj_ref.id);
        // Everything else in the stream is cached for later lookups
        let mut cache = self.object_cache.borrow_mut();
        for (id, object) in objects {
            let key = ObjectRef::new(id, 0);
            if matches!(self.xref.get(id), Some(XRefEntry::Compressed { stream, .. }) if *stream == stream_id)
            {
                cache.entry(key).or_insert(object);
            }
        }

        wanted.ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// Follow a reference (and references to references) to a direct object.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_RECURSION_DEPTH {
            match current {
                Object::Reference(r) => current = self.load_object(r)?,
                other => return Ok(other),
            }
        }
        Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH))
    }

    /// Resolve a dictionary entry, treating a missing key as `None`.
    pub fn resolve_key(&self, dict: &Dict, key: &str) -> Result<Option<Object>> {
        match dict.get(key) {
            Some(obj) => self.resolve(obj).map(|o| if o.is_null() { None } else { Some(o) }),
            None => Ok(None),
        }
    }

    /// Document catalog (`/Root`).
    pub fn catalog(&self) -> Result<Dict> {
        let root = self
            .trailer
            .get("Root")
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root".to_string()))?;
        match self.resolve(root)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Byte offsets just past each `%%EOF`, one per revision.
    pub fn revision_boundaries(&self) -> Vec<usize> {
        xref::revision_ends(&self.data)
    }

    /// Every signed signature field, ordered by where its signed range ends.
    pub fn embedded_signatures(&self) -> Result<Vec<EmbeddedSignature>> {
        let catalog = self.catalog()?;
        let Some(acro_form) = self.resolve_key(&catalog, "AcroForm")? else {
            return Ok(Vec::new());
        };
        let Some(acro_form) = acro_form.as_dict() else {
            log::warn!("/AcroForm is not a dictionary");
            return Ok(Vec::new());
        };
        let Some(fields) = self.resolve_key(acro_form, "Fields")? else {
            return Ok(Vec::new());
        };

        let mut walker = FieldWalker {
            reader: self,
            visited: HashSet::new(),
            found: Vec::new(),
        };
        let inherited = Inherited::default();
        for field in fields.as_array().map(Vec::as_slice).unwrap_or_default() {
            walker.visit(field, &inherited, 0)?;
        }

        let mut found = walker.found;
        found.sort_by_key(|sig| sig.signed_end());
        log::debug!("found {} signed signature fields", found.len());
        Ok(found)
    }
}

/// Field attributes passed down to `/Kids`.
#[derive(Default, Clone)]
struct Inherited {
    name: Option<String>,
    field_type: Option<String>,
}

struct FieldWalker<'a> {
    reader: &'a PdfReader,
    visited: HashSet<ObjectRef>,
    found: Vec<EmbeddedSignature>,
}

impl FieldWalker<'_> {
    fn visit(&mut self, field: &Object, parent: &Inherited, depth: u32) -> Result<()> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
        }
        let field_ref = field.as_reference();
        if let Some(r) = field_ref {
            if !self.visited.insert(r) {
                log::warn!("field tree revisits {}", r);
                return Ok(());
            }
        }

        let resolved = self.reader.resolve(field)?;
        let Some(dict) = resolved.as_dict() else {
            return Ok(());
        };

        let partial = dict.get("T").and_then(Object::as_text);
        let name = match (&parent.name, partial) {
            (Some(parent), Some(own)) => Some(format!("{}.{}", parent, own)),
            (None, Some(own)) => Some(own),
            (parent, None) => parent.clone(),
        };
        let field_type = dict
            .get("FT")
            .and_then(Object::as_name)
            .map(str::to_string)
            .or_else(|| parent.field_type.clone());
        let here = Inherited { name, field_type };

        if here.field_type.as_deref() == Some("Sig") {
            if let Some(value) = self.reader.resolve_key(dict, "V")? {
                if let Some(sig_dict) = value.as_dict() {
                    let field_name = here.name.clone().unwrap_or_else(|| "Unnamed".to_string());
                    self.found
                        .push(EmbeddedSignature::from_dict(field_name, field_ref, sig_dict.clone())?);
                }
            }
        }

        if let Some(kids) = self.reader.resolve_key(dict, "Kids")? {
            for kid in kids.as_array().map(Vec::as_slice).unwrap_or_default() {
                self.visit(kid, &here, depth + 1)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a classic single-revision file with a correct xref table.
    fn build_pdf(objects: &[&str]) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_at
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.4\n").unwrap(), (1, 4));
        assert_eq!(parse_header(b"junk\n%PDF-2.0\n").unwrap(), (2, 0));
        assert!(matches!(parse_header(b"hello world"), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_catalog_and_load_object() {
        let pdf = build_pdf(&["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Count 0 /Kids [] >>"]);
        let reader = PdfReader::from_bytes(pdf).unwrap();
        assert_eq!(reader.version(), (1, 7));
        let catalog = reader.catalog().unwrap();
        assert_eq!(catalog["Type"].as_name(), Some("Catalog"));

        let pages = reader.resolve(&catalog["Pages"]).unwrap();
        assert_eq!(pages.as_dict().unwrap()["Count"].as_integer(), Some(0));
    }

    #[test]
    fn test_missing_object_is_null() {
        let pdf = build_pdf(&["<< /Type /Catalog >>"]);
        let reader = PdfReader::from_bytes(pdf).unwrap();
        assert_eq!(reader.load_object(ObjectRef::new(42, 0)).unwrap(), Object::Null);
    }

    #[test]
    fn test_reference_cycle_is_detected() {
        let pdf = build_pdf(&["<< /Type /Catalog >>", "3 0 R", "2 0 R"]);
        let reader = PdfReader::from_bytes(pdf).unwrap();
        // Each object is a bare reference, so resolving chases 2 -> 3 -> 2 ...
        assert!(matches!(
            reader.resolve(&Object::Reference(ObjectRef::new(2, 0))),
            Err(Error::RecursionLimitExceeded(_))
        ));
    }

    #[test]
    fn test_encrypted_document_is_refused() {
        let mut pdf = build_pdf(&["<< /Type /Catalog >>"]);
        let text = String::from_utf8(pdf.clone()).unwrap();
        let patched = text.replace("/Root 1 0 R", "/Root 1 0 R /Encrypt 1 0 R");
        // Offsets before the trailer are unchanged, so the xref stays valid
        pdf = patched.into_bytes();
        assert!(matches!(PdfReader::from_bytes(pdf), Err(Error::Encrypted)));
    }

    #[test]
    fn test_broken_startxref_falls_back_to_scan() {
        let pdf = build_pdf(&["<< /Type /Catalog >>"]);
        let text = String::from_utf8(pdf).unwrap();
        let start = text.rfind("startxref\n").unwrap() + "startxref\n".len();
        let mut broken = text[..start].to_string();
        broken.push_str("999999\n%%EOF\n");

        let reader = PdfReader::from_bytes(broken.into_bytes()).unwrap();
        assert_eq!(reader.catalog().unwrap()["Type"].as_name(), Some("Catalog"));
    }

    #[test]
    fn test_no_acroform_means_no_signatures() {
        let pdf = build_pdf(&["<< /Type /Catalog >>"]);
        let reader = PdfReader::from_bytes(pdf).unwrap();
        assert!(reader.embedded_signatures().unwrap().is_empty());
    }

    #[test]
    fn test_unsigned_signature_field_is_skipped() {
        let pdf = build_pdf(&[
            "<< /Type /Catalog /AcroForm << /Fields [2 0 R] >> >>",
            "<< /FT /Sig /T (Empty) >>",
        ]);
        let reader = PdfReader::from_bytes(pdf).unwrap();
        assert!(reader.embedded_signatures().unwrap().is_empty());
    }

    #[test]
    fn test_signature_field_type_is_inherited() {
        let pdf = build_pdf(&[
            "<< /Type /Catalog /AcroForm << /Fields [2 0 R] >> >>",
            "<< /FT /Sig /T (Parent) /Kids [3 0 R] >>",
            "<< /T (Child) /V 4 0 R /Parent 2 0 R >>",
            "<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached /ByteRange [0 10 20 5] /Contents <3000> >>",
        ]);
        let reader = PdfReader::from_bytes(pdf).unwrap();
        let sigs = reader.embedded_signatures().unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].field_name, "Parent.Child");
        assert_eq!(sigs[0].field_ref, Some(ObjectRef::new(3, 0)));
        assert_eq!(sigs[0].contents, vec![0x30, 0x00]);
    }
}
