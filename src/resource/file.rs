//! File resource - extra files mounted into instance pods

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use declarative::{
    IdentityScheme, LegacyFormat, ResourceAdapter, ResourceKey, Slot, split_bounded,
};
use rpaas_client::{Backend, ExtraFile};
use serde::{Deserialize, Serialize};

use super::{ApiFailure, Converge, Kind, Spec, exactly_one, instance_of};

static FILE_NAME: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_.-]+$").expect("FILE_NAME is a valid regex pattern")
});

/// Identifier layout for files
pub const SCHEME: IdentityScheme = IdentityScheme {
    kind: "file",
    slots: &[Slot::required("name")],
    legacy: &[LegacyFormat {
        shape: "<service>/<instance>/<name>",
        parse: legacy_slashed,
    }],
};

// The name absorbs any further slashes
fn legacy_slashed(id: &str) -> Option<ResourceKey> {
    let parts = split_bounded(id, "/", 3)?;
    Some(ResourceKey::new(parts[0], parts[1]).with(parts[2]))
}

/// A file as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub service_name: String,
    pub instance: String,
    pub name: String,
    /// UTF-8 content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Binary content, base64-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
}

impl FileSpec {
    /// Bytes to upload
    pub fn bytes(&self) -> anyhow::Result<Vec<u8>> {
        match (&self.content, &self.content_base64) {
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => STANDARD
                .decode(encoded.trim())
                .map_err(|e| anyhow::anyhow!("content_base64 is not valid base64: {e}")),
            _ => anyhow::bail!("exactly one of content or content_base64 must be set"),
        }
    }
}

impl Spec for FileSpec {
    const KIND: Kind = Kind::File;

    fn validate(&self) -> anyhow::Result<()> {
        super::require_instance(&self.service_name, &self.instance)?;
        if !FILE_NAME.is_match(&self.name) {
            anyhow::bail!(
                "invalid file name '{}' (only letters, digits, '_', '.' and '-' are allowed)",
                self.name
            );
        }
        exactly_one(
            ("content", self.content.is_some()),
            ("content_base64", self.content_base64.is_some()),
        )?;
        self.bytes().map(|_| ())
    }
}

/// File read back from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Set when the content is reported as text
    pub content: Option<String>,
    /// Set when the content is reported as base64
    pub content_base64: Option<String>,
}

pub struct FileAdapter<'a> {
    api: &'a dyn Backend,
}

impl<'a> FileAdapter<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self { api }
    }
}

impl ResourceAdapter for FileAdapter<'_> {
    type Desired = FileSpec;
    type Payload = ExtraFile;
    type Remote = ExtraFile;
    type Observed = FileState;
    type Error = ApiFailure;

    fn scheme(&self) -> &'static IdentityScheme {
        &SCHEME
    }

    fn key(&self, desired: &FileSpec) -> ResourceKey {
        ResourceKey::new(&desired.service_name, &desired.instance).with(&desired.name)
    }

    fn payload(&self, key: &ResourceKey, desired: &FileSpec) -> declarative::Result<ExtraFile> {
        let content = desired.bytes().map_err(|e| {
            declarative::Error::invalid_desired(SCHEME.kind, format!("{}: {e}", desired.name))
        })?;
        Ok(ExtraFile {
            name: key.discriminator(0).to_string(),
            content,
        })
    }

    // Add and replace are separate endpoints; the lookup picks one
    fn mutate(&self, key: &ResourceKey, payload: &ExtraFile) -> Result<(), ApiFailure> {
        let at = instance_of(key);
        let files = std::slice::from_ref(payload);
        match self.api.get_file(&at, &payload.name) {
            Ok(_) => Ok(self.api.update_files(&at, files)?),
            Err(err) if err.is_not_found() => Ok(self.api.add_files(&at, files)?),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self, key: &ResourceKey) -> Result<Vec<ExtraFile>, ApiFailure> {
        let at = instance_of(key);
        let name = key.discriminator(0);
        if name.is_empty() {
            return Ok(self.api.list_files(&at)?);
        }
        match self.api.get_file(&at, name) {
            Ok(file) => Ok(vec![file]),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn discriminators(&self, remote: &ExtraFile) -> Vec<String> {
        vec![remote.name.clone()]
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), ApiFailure> {
        let names = [key.discriminator(0).to_string()];
        Ok(self.api.delete_files(&instance_of(key), &names)?)
    }

    fn observe(&self, _key: &ResourceKey, remote: ExtraFile, desired: Option<&FileSpec>) -> FileState {
        let wants_base64 = desired.is_some_and(|d| d.content_base64.is_some());
        let text = if wants_base64 {
            None
        } else {
            String::from_utf8(remote.content.clone()).ok()
        };
        let content_base64 = text.is_none().then(|| STANDARD.encode(&remote.content));

        FileState {
            name: remote.name,
            bytes: remote.content,
            content: text,
            content_base64,
        }
    }
}

impl Converge for FileAdapter<'_> {
    fn drift(&self, observed: &FileState, desired: &FileSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if observed.name != desired.name {
            fields.push("name");
        }
        match desired.bytes() {
            Ok(bytes) if bytes == observed.bytes => {}
            _ if desired.content.is_some() => fields.push("content"),
            _ => fields.push("content_base64"),
        }
        fields
    }

    fn describe(&self, observed: &FileState) -> Vec<(&'static str, String)> {
        let size = crate::ui::payload_size(observed.bytes.len());
        let encoding = if observed.content.is_some() { "text" } else { "base64" };
        vec![
            ("name", observed.name.clone()),
            ("content", format!("{size} ({encoding})")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Error, Reconciler};
    use rpaas_client::{Instance, MockBackend};

    fn at() -> Instance {
        Instance::new("rpaasv2-be", "my-rpaas")
    }

    fn text(name: &str, content: &str) -> FileSpec {
        FileSpec {
            service_name: "rpaasv2-be".into(),
            instance: "my-rpaas".into(),
            name: name.into(),
            content: Some(content.into()),
            content_base64: None,
        }
    }

    #[test]
    fn test_validate_file_name() {
        assert!(text("index.html", "<h1>").validate().is_ok());
        assert!(text("my_file-2.conf", "x").validate().is_ok());
        assert!(text("../etc/passwd", "x").validate().is_err());
        assert!(text("with space", "x").validate().is_err());
        assert!(text("", "x").validate().is_err());
    }

    #[test]
    fn test_validate_content_alternatives() {
        let mut both = text("a.txt", "x");
        both.content_base64 = Some("eA==".into());
        assert!(both.validate().is_err());

        let mut bad = text("a.txt", "x");
        bad.content = None;
        bad.content_base64 = Some("not base64!".into());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_legacy_name_keeps_slashes() {
        let decoded = SCHEME.decode("rpaasv2-be/my-rpaas/dir/index.html").unwrap();
        assert!(decoded.is_legacy());
        assert_eq!(decoded.key.discriminator(0), "dir/index.html");
    }

    #[test]
    fn test_create_then_update() {
        let api = MockBackend::new();
        let adapter = FileAdapter::new(&api);
        let reconciler = Reconciler::new(&adapter);

        let managed = reconciler.create(&text("index.html", "v1")).unwrap();
        assert_eq!(managed.id, "rpaasv2-be::my-rpaas::index.html");
        assert_eq!(managed.observed.content.as_deref(), Some("v1"));

        let updated = reconciler.update(&managed.id, &text("index.html", "v2")).unwrap();
        assert_eq!(updated.observed.content.as_deref(), Some("v2"));
        assert_eq!(api.calls("add_files"), 1);
        assert_eq!(api.calls("update_files"), 1);
    }

    #[test]
    fn test_create_replaces_existing_file() {
        let api = MockBackend::new();
        api.with_instance(&at(), |data| {
            data.files.push(ExtraFile {
                name: "index.html".into(),
                content: b"old".to_vec(),
            });
        });
        let adapter = FileAdapter::new(&api);

        let managed = Reconciler::new(&adapter)
            .create(&text("index.html", "new"))
            .unwrap();
        assert_eq!(managed.observed.content.as_deref(), Some("new"));
        assert_eq!(api.calls("add_files"), 0);
        assert_eq!(api.calls("update_files"), 1);
        assert_eq!(api.snapshot(&at()).files.len(), 1);
    }

    #[test]
    fn test_create_recovers_from_unconfirmed_create() {
        let api = MockBackend::new();
        let adapter = FileAdapter::new(&api);
        let reconciler = Reconciler::new(&adapter);

        // Upload succeeds, then the confirming read fails
        api.fail_next("get_file", rpaas_client::Error::status(404, "file not found"));
        api.fail_next("get_file", rpaas_client::Error::status(500, "etcd timeout"));
        let err = reconciler.create(&text("index.html", "v1")).unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(api.snapshot(&at()).files.len(), 1);

        let managed = reconciler.create(&text("index.html", "v1")).unwrap();
        assert_eq!(managed.id, "rpaasv2-be::my-rpaas::index.html");
        assert_eq!(api.calls("add_files"), 1);
        assert_eq!(api.calls("update_files"), 1);
    }

    #[test]
    fn test_undecodable_content_is_rejected_before_any_call() {
        let api = MockBackend::new();
        let adapter = FileAdapter::new(&api);
        let spec = FileSpec {
            content: None,
            content_base64: Some("not base64!".into()),
            ..text("blob.bin", "")
        };

        let err = Reconciler::new(&adapter).create(&spec).unwrap_err();
        assert!(matches!(err, Error::InvalidDesired { kind: "file", .. }));
        assert!(err.category().needs_operator());
        assert_eq!(api.calls("get_file") + api.calls("add_files"), 0);
    }

    #[test]
    fn test_binary_content_reported_as_base64() {
        let api = MockBackend::new();
        let adapter = FileAdapter::new(&api);
        let spec = FileSpec {
            content: None,
            content_base64: Some(STANDARD.encode([0xff, 0xfe, 0x00])),
            ..text("blob.bin", "")
        };

        let managed = Reconciler::new(&adapter).create(&spec).unwrap();
        assert_eq!(managed.observed.content, None);
        assert_eq!(managed.observed.content_base64.as_deref(), Some("//4A"));
        assert!(adapter.drift(&managed.observed, &spec).is_empty());
    }

    #[test]
    fn test_base64_requested_for_text() {
        let api = MockBackend::new();
        let adapter = FileAdapter::new(&api);
        let spec = FileSpec {
            content: None,
            content_base64: Some(STANDARD.encode("hello")),
            ..text("hello.txt", "")
        };

        let managed = Reconciler::new(&adapter).create(&spec).unwrap();
        assert_eq!(managed.observed.content, None);
        assert_eq!(managed.observed.content_base64.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn test_out_of_band_edit_is_drift() {
        let api = MockBackend::new();
        let adapter = FileAdapter::new(&api);
        let reconciler = Reconciler::new(&adapter);
        let managed = reconciler.create(&text("index.html", "v1")).unwrap();

        api.with_instance(&at(), |data| data.files[0].content = b"tampered".to_vec());
        let observed = reconciler
            .read(&managed.id, Some(&text("index.html", "v1")))
            .unwrap()
            .managed()
            .unwrap()
            .observed;
        assert_eq!(adapter.drift(&observed, &text("index.html", "v1")), vec!["content"]);
    }
}
