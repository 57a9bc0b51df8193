//! Tracking link construction.

use std::path::Path;

use tracing::info;
use url::Url;

use crate::error::LinkError;
use crate::ident::{encode, IdAllocator};
use crate::params::TrackingParameters;
use crate::template::{Fields, Template};

/// Values a URL template may reference.
///
/// `id` is exposed as `ID`, `token` as `Token`; `extra` entries keep their
/// own names.
#[derive(Debug, Clone, Default)]
pub struct LinkFields {
    pub id: Option<u64>,
    pub token: Option<String>,
    pub extra: Fields,
}

impl LinkFields {
    /// Fields for a freshly allocated identifier and its token.
    pub fn for_id(id: u64) -> Self {
        Self {
            id: Some(id),
            token: Some(encode(id)),
            extra: Fields::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    fn to_fields(&self) -> Fields {
        let mut fields = self.extra.clone();
        if let Some(id) = self.id {
            fields.insert("ID".to_string(), id.to_string());
        }
        if let Some(token) = &self.token {
            fields.insert("Token".to_string(), token.clone());
        }
        fields
    }
}

/// Fields for `template`, allocating an identifier only when the template
/// refers to `ID` or `Token`.
pub fn fields_for_template(
    template: &str,
    allocator: &dyn IdAllocator,
) -> Result<LinkFields, LinkError> {
    let parsed = Template::parse(template)?;
    if !(parsed.references("ID") || parsed.references("Token")) {
        return Ok(LinkFields::default());
    }

    let id = allocator.allocate()?;
    Ok(LinkFields::for_id(id))
}

/// Build a tracking link.
///
/// The template is expanded with `fields` and parsed as an absolute URL. A
/// non-empty `explicit_path` replaces the path verbatim. The query string is
/// the form encoding of `params`, replacing any query the template carried.
pub fn build(
    template: &str,
    fields: &LinkFields,
    explicit_path: Option<&str>,
    params: &TrackingParameters,
) -> Result<Url, LinkError> {
    let candidate = Template::parse(template)?.render(&fields.to_fields())?;

    let mut url = Url::parse(&candidate).map_err(|source| LinkError::MalformedUrl {
        candidate: candidate.clone(),
        source,
    })?;

    if let Some(path) = explicit_path.filter(|p| !p.is_empty()) {
        url.set_path(path);
    }

    let query = params.encode();
    url.set_query(if query.is_empty() { None } else { Some(&query) });

    Ok(url)
}

/// Allocate an identifier and build a link to a tracking image.
///
/// The image must exist under `image_dir`. The template sees `ID`, `Token`
/// and `File`. Returns the link and the identifier it was built for.
pub fn image_link(
    template: &str,
    allocator: &dyn IdAllocator,
    image_dir: &Path,
    image_file: &str,
    params: &TrackingParameters,
) -> Result<(Url, u64), LinkError> {
    let image_path = image_dir.join(image_file);
    if !image_path.exists() {
        return Err(LinkError::MissingImage(image_path.display().to_string()));
    }

    let id = allocator.allocate()?;
    let fields = LinkFields::for_id(id).with("File", image_file);
    let url = build(template, &fields, None, params)?;

    info!(
        id = id,
        token = ?fields.token,
        image = %image_file,
        url = %url,
        "image_link_created"
    );

    Ok((url, id))
}
