use {
    fs_err::{self as fs, File},
    sealpost_protocol::{ClientIdentity, ContentHash},
    sealpost_sdk::TransferError,
    serde::{Deserialize, Serialize},
    std::{
        io::{self, Write},
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
    tracing::{debug, warn},
};

const INCOMING_PREFIX: &str = ".incoming-";

/// Received content, split into one namespace directory per sender.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    #[inline]
    pub fn new(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Opens the namespace of `identity`, creating its directory if needed.
    #[inline]
    pub fn namespace(&self, identity: &ClientIdentity) -> io::Result<Namespace> {
        let dir = self.root.join(identity.as_str());
        fs::create_dir_all(&dir)?;
        Ok(Namespace {
            dir,
            identity: identity.clone(),
        })
    }
}

/// Origin of a stored file, kept next to it in a hidden sidecar file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub filename: String,
    pub client: ClientIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Hex-encoded content hash; also the file name.
    pub name: String,
    pub size: u64,
    pub provenance: Option<Provenance>,
}

/// Content-addressed files received from one sender.
///
/// Committed content is stored under the hex encoding of its SHA-512. Files
/// whose names start with a dot are sidecars and in-flight temporary files.
#[derive(Debug)]
pub struct Namespace {
    dir: PathBuf,
    identity: ClientIdentity,
}

impl Namespace {
    #[must_use]
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn content_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(hash.to_hex())
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!(".{name}"))
    }

    #[inline]
    pub fn is_duplicate(&self, hash: &ContentHash) -> io::Result<bool> {
        self.content_path(hash).try_exists()
    }

    /// Creates a temporary file for incoming content.
    ///
    /// The file lives in the namespace directory so that committing it is a
    /// rename within one filesystem.
    #[inline]
    pub fn create_file(&self) -> io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(INCOMING_PREFIX)
            .tempfile_in(&self.dir)
    }

    /// Moves received content to its final name if its hash is the expected one.
    ///
    /// On mismatch the temporary file is deleted and nothing becomes visible
    /// under the content name.
    #[inline]
    pub fn verify_and_commit(
        &self,
        mut file: NamedTempFile,
        actual: &ContentHash,
        expected: &ContentHash,
        original_name: &str,
    ) -> Result<(), TransferError> {
        if actual != expected {
            file.close()?;
            return Err(TransferError::IntegrityMismatch {
                name: original_name.to_owned(),
            });
        }
        file.flush()?;
        file.as_file().sync_all()?;

        let provenance = Provenance {
            filename: original_name.to_owned(),
            client: self.identity.clone(),
        };
        let sidecar = self.sidecar_path(&expected.to_hex());
        fs::write(
            &sidecar,
            serde_json::to_vec(&provenance).map_err(io::Error::from)?,
        )?;
        let path = self.content_path(expected);
        if let Err(err) = file.persist(&path) {
            if let Err(remove_err) = fs::remove_file(&sidecar) {
                warn!(?remove_err, "failed to remove provenance of uncommitted file");
            }
            return Err(io::Error::from(err).into());
        }
        debug!(path = %path.display(), "committed file");
        Ok(())
    }

    #[inline]
    pub fn open_file(&self, hash: &ContentHash) -> io::Result<File> {
        File::open(self.content_path(hash))
    }

    #[inline]
    pub fn provenance(&self, name: &str) -> io::Result<Option<Provenance>> {
        let data = match fs::read(self.sidecar_path(name)) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(Some(serde_json::from_slice(&data).map_err(io::Error::from)?))
    }

    /// Committed files of this namespace, sorted by name.
    #[inline]
    pub fn files(&self) -> io::Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let metadata = entry.metadata()?;
            if name.starts_with('.') || !metadata.is_file() {
                continue;
            }
            files.push(StoredFile {
                provenance: self.provenance(&name)?,
                name,
                size: metadata.len(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}
