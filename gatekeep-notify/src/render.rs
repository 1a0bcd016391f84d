//! Email bodies rendered with Tera.
//!
//! Templates are embedded at compile time. A resources directory may
//! override any of them with `tpl/<name>.tera` and supply the inline images
//! `img/sysheader.jpg` and `img/sysfooter.jpg`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::{io_err, NotifyError};

const TPLS: &[(&str, &str)] = &[
    ("layout.html.tera", include_str!("templates/layout.html.tera")),
    ("granted.html.tera", include_str!("templates/granted.html.tera")),
    ("revoked.html.tera", include_str!("templates/revoked.html.tera")),
    ("test.html.tera", include_str!("templates/test.html.tera")),
];

pub const HEADER_IMAGE: &str = "sysheader.jpg";
pub const FOOTER_IMAGE: &str = "sysfooter.jpg";

/// Which message to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailKind {
    Granted,
    Revoked,
    Test,
}

impl EmailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailKind::Granted => "granted",
            EmailKind::Revoked => "revoked",
            EmailKind::Test => "test",
        }
    }

    pub fn default_subject(self) -> &'static str {
        match self {
            EmailKind::Granted => "Website Access Granted",
            EmailKind::Revoked => "Website Access Removed",
            EmailKind::Test => "Test Email",
        }
    }

    fn template(self) -> String {
        format!("{}.html.tera", self.as_str())
    }
}

/// Everything needed to address and fill in one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRequest {
    pub kind: EmailKind,
    /// Recipient address.
    pub to: String,
    /// Recipient display name for the `To` header. May be empty.
    pub to_name: String,
    pub first_name: String,
    /// Club, society or project the site belongs to.
    pub classification: String,
    /// Site folder, i.e. the site name.
    pub folder: String,
    /// Empty means [`EmailKind::default_subject`].
    pub subject: String,
}

impl EmailRequest {
    pub fn new(kind: EmailKind, to: impl Into<String>) -> Self {
        Self {
            kind,
            to: to.into(),
            to_name: String::new(),
            first_name: String::new(),
            classification: String::new(),
            folder: String::new(),
            subject: String::new(),
        }
    }

    pub fn subject(&self) -> &str {
        if self.subject.is_empty() {
            self.kind.default_subject()
        } else {
            &self.subject
        }
    }
}

/// An image attached inline and referenced from the body as `cid:<content_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub content_id: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

#[derive(Serialize)]
struct TemplateData<'a> {
    subject: &'a str,
    name: &'a str,
    classification: &'a str,
    folder: &'a str,
    header_image: Option<&'a str>,
    footer_image: Option<&'a str>,
}

pub struct EmailRenderer {
    tera: Tera,
    images: Vec<InlineImage>,
}

impl EmailRenderer {
    /// Embedded templates only, no images.
    pub fn new() -> Result<Self, NotifyError> {
        Ok(Self {
            tera: build_tera(None)?,
            images: Vec::new(),
        })
    }

    /// Embedded templates overridden from `<resources>/tpl`, plus inline
    /// images from `<resources>/img`. Either directory may be absent.
    pub fn from_resources(resources: &Path) -> Result<Self, NotifyError> {
        let tera = build_tera(Some(&resources.join("tpl")))?;
        let mut images = Vec::new();
        for name in [HEADER_IMAGE, FOOTER_IMAGE] {
            let path = resources.join("img").join(name);
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "inline image not found, skipping");
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            images.push(InlineImage {
                content_id: name.to_string(),
                bytes,
            });
        }
        Ok(Self { tera, images })
    }

    pub fn images(&self) -> &[InlineImage] {
        &self.images
    }

    pub fn render(&self, request: &EmailRequest) -> Result<RenderedEmail, NotifyError> {
        let subject = request.subject();
        let data = TemplateData {
            subject,
            name: &request.first_name,
            classification: &request.classification,
            folder: &request.folder,
            header_image: self.image(HEADER_IMAGE),
            footer_image: self.image(FOOTER_IMAGE),
        };
        let context = Context::from_serialize(&data)?;
        let html = self.tera.render(&request.kind.template(), &context)?;
        Ok(RenderedEmail {
            subject: subject.to_string(),
            html,
        })
    }

    fn image(&self, name: &str) -> Option<&str> {
        self.images
            .iter()
            .find(|i| i.content_id == name)
            .map(|i| i.content_id.as_str())
    }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, NotifyError> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut templates = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let path: PathBuf = entry.map_err(|e| io_err(dir, e))?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        tracing::debug!(template = %rel.display(), "using template override");
        templates.push((normalize_template_name(rel), contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, NotifyError> {
    let mut templates: HashMap<String, String> = TPLS
        .iter()
        .map(|(name, content)| (name.to_string(), content.to_string()))
        .collect();
    if let Some(dir) = user_template_dir {
        templates.extend(load_user_templates(dir)?);
    }

    let mut tera = Tera::default();
    tera.autoescape_on(vec![".html.tera"]);
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
    Ok(tera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn granted() -> EmailRequest {
        EmailRequest {
            first_name: "Ada".into(),
            classification: "Computing Society".into(),
            folder: "docsoc".into(),
            ..EmailRequest::new(EmailKind::Granted, "ada@example.com")
        }
    }

    #[test]
    fn embedded_templates_render_every_kind() {
        let renderer = EmailRenderer::new().unwrap();
        for kind in [EmailKind::Granted, EmailKind::Revoked, EmailKind::Test] {
            let email = renderer.render(&EmailRequest::new(kind, "a@example.com")).unwrap();
            assert_eq!(email.subject, kind.default_subject());
            assert!(email.html.contains("<html>"), "{kind:?}");
        }
    }

    #[test]
    fn granted_body_names_site_and_person() {
        let email = EmailRenderer::new().unwrap().render(&granted()).unwrap();
        assert_eq!(email.subject, "Website Access Granted");
        assert!(email.html.contains("Dear Ada"));
        assert!(email.html.contains("Computing Society"));
        assert!(email.html.contains("<code>docsoc</code>"));
        assert!(!email.html.contains("cid:"));
    }

    #[test]
    fn values_are_html_escaped() {
        let mut request = granted();
        request.classification = "Rock & Roll <Society>".into();
        let email = EmailRenderer::new().unwrap().render(&request).unwrap();
        assert!(email.html.contains("Rock &amp; Roll &lt;Society&gt;"));
    }

    #[test]
    fn resources_override_templates_and_add_images() {
        let res = TempDir::new().unwrap();
        std::fs::create_dir_all(res.path().join("tpl")).unwrap();
        std::fs::create_dir_all(res.path().join("img")).unwrap();
        std::fs::write(
            res.path().join("tpl").join("granted.html.tera"),
            "{% extends \"layout.html.tera\" %}{% block body %}custom {{ folder }}{% endblock body %}",
        )
        .unwrap();
        std::fs::write(res.path().join("img").join(HEADER_IMAGE), b"jpeg").unwrap();

        let renderer = EmailRenderer::from_resources(res.path()).unwrap();
        assert_eq!(renderer.images().len(), 1);

        let email = renderer.render(&granted()).unwrap();
        assert!(email.html.contains("custom docsoc"));
        assert!(email.html.contains("cid:sysheader.jpg"));
        assert!(!email.html.contains("cid:sysfooter.jpg"));
    }

    #[test]
    fn explicit_subject_wins() {
        let mut request = granted();
        request.subject = "Hello".into();
        assert_eq!(EmailRenderer::new().unwrap().render(&request).unwrap().subject, "Hello");
    }
}
