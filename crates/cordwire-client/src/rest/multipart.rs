//! `multipart/form-data` bodies for file uploads.
//!
//! A [`Multipart`] records its parts so the request it belongs to can be
//! cloned and retried; [`Multipart::to_form`] builds a fresh
//! `reqwest::multipart::Form` for each attempt.

use reqwest::multipart::{Form, Part};

use cordwire_core::error::{CordError, CordResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        mime: String,
        data: Vec<u8>,
    },
}

/// Ordered list of form parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Multipart {
    parts: Vec<FormPart>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain form field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a file part.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            filename: filename.into(),
            mime: mime.into(),
            data,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Build the form reqwest sends. Fails on a malformed MIME type.
    pub fn to_form(&self) -> CordResult<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                FormPart::File {
                    name,
                    filename,
                    mime,
                    data,
                } => {
                    let file = Part::bytes(data.clone())
                        .file_name(filename.clone())
                        .mime_str(mime)
                        .map_err(|e| CordError::Codec(format!("invalid mime type {mime}: {e}")))?;
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_keep_their_order() {
        let form = Multipart::new()
            .text("payload_json", r#"{"content":"hi"}"#)
            .file("file", "a.txt", "text/plain", b"hello".to_vec());

        assert_eq!(form.parts().len(), 2);
        assert!(matches!(&form.parts()[0], FormPart::Text { name, .. } if name == "payload_json"));
        match &form.parts()[1] {
            FormPart::File {
                filename, mime, data, ..
            } => {
                assert_eq!(filename, "a.txt");
                assert_eq!(mime, "text/plain");
                assert_eq!(data, b"hello");
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn each_form_gets_its_own_boundary() {
        let form = Multipart::new().file("file", "a.bin", "application/octet-stream", vec![1, 2]);
        let a = form.to_form().unwrap();
        let b = form.to_form().unwrap();
        assert!(!a.boundary().is_empty());
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn bad_mime_type_is_rejected() {
        let form = Multipart::new().file("file", "a.bin", "not a mime", Vec::new());
        assert!(matches!(form.to_form(), Err(CordError::Codec(_))));
    }
}
