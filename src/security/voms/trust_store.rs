//! Attribute Authority Trust Store
//!
//! Holds the certificates of trusted VOMS attribute authorities. Readers take
//! a lock-free snapshot; reloads build a complete new snapshot and swap it in.

use crate::error::{Result, VomsError};
use crate::security::cert::{ChainCertificate, DistinguishedName};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustls::Certificate;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CERTIFICATE_EXTENSIONS: &[&str] = &["pem", "crt", "cer"];

#[derive(Debug, Clone)]
enum TrustSource {
    Directory(PathBuf),
    Static,
}

pub struct VomsTrustStore {
    source: TrustSource,
    authorities: ArcSwap<Vec<ChainCertificate>>,
    reload_lock: Mutex<()>,
}

impl VomsTrustStore {
    /// Load every PEM certificate below `path`, descending into per-VO
    /// subdirectories. Fails if the directory cannot be read or yields no
    /// certificate at all.
    pub fn from_directory(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let authorities = load_directory(&path)?;
        info!(
            path = %path.display(),
            count = authorities.len(),
            "Loaded VOMS attribute authority certificates"
        );

        Ok(Self {
            source: TrustSource::Directory(path),
            authorities: ArcSwap::from_pointee(authorities),
            reload_lock: Mutex::new(()),
        })
    }

    /// Trust exactly the given certificates. An empty set is allowed and
    /// makes every attribute certificate untrusted.
    pub fn from_certificates(certificates: &[Certificate]) -> Result<Self> {
        let authorities = certificates
            .iter()
            .map(ChainCertificate::parse)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| VomsError::ValidatorUnavailable(e.to_string()))?;

        Ok(Self {
            source: TrustSource::Static,
            authorities: ArcSwap::from_pointee(authorities),
            reload_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.authorities.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Arc<Vec<ChainCertificate>> {
        self.authorities.load_full()
    }

    /// Authority certificates whose subject equals `subject`
    pub fn find_by_subject(&self, subject: &DistinguishedName) -> Vec<ChainCertificate> {
        self.authorities
            .load()
            .iter()
            .filter(|cert| cert.subject() == subject)
            .cloned()
            .collect()
    }

    pub fn is_trusted(&self, subject: &DistinguishedName) -> bool {
        self.authorities.load().iter().any(|cert| cert.subject() == subject)
    }

    /// Re-read the backing directory and swap in the new snapshot. On error
    /// the previous snapshot stays in place.
    pub fn reload(&self) -> Result<usize> {
        let _guard = self.reload_lock.lock();
        match &self.source {
            TrustSource::Directory(path) => {
                let authorities = load_directory(path)?;
                let count = authorities.len();
                self.authorities.store(Arc::new(authorities));
                debug!(path = %path.display(), count, "Reloaded VOMS trust store");
                Ok(count)
            }
            TrustSource::Static => Ok(self.len()),
        }
    }

    /// Periodically reload the store on the tokio runtime
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reloading = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || reloading.reload()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "VOMS trust store refresh failed, keeping previous snapshot"),
                    Err(e) => warn!(error = %e, "VOMS trust store refresh task failed"),
                }
            }
        })
    }
}

fn load_directory(path: &Path) -> Result<Vec<ChainCertificate>> {
    let mut authorities = Vec::new();
    collect_certificates(path, &mut authorities).map_err(|e| {
        VomsError::ValidatorUnavailable(format!("cannot read VOMS directory {}: {}", path.display(), e))
    })?;

    if authorities.is_empty() {
        return Err(VomsError::ValidatorUnavailable(format!(
            "no attribute authority certificates found in {}",
            path.display()
        )));
    }
    Ok(authorities)
}

fn collect_certificates(dir: &Path, out: &mut Vec<ChainCertificate>) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_certificates(&path, out)?;
            continue;
        }
        // only real subdirectories are descended, a linked one may loop
        if file_type.is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "Skipping symlinked directory in VOMS directory");
            continue;
        }

        let is_certificate = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| CERTIFICATE_EXTENSIONS.contains(&ext));
        if !is_certificate {
            continue;
        }

        let file = fs::File::open(&path)?;
        let ders = match rustls_pemfile::certs(&mut BufReader::new(file)) {
            Ok(ders) => ders,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable certificate file");
                continue;
            }
        };

        for der in ders {
            match ChainCertificate::parse(&Certificate(der)) {
                Ok(cert) => out.push(cert),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid certificate"),
            }
        }
    }
    Ok(())
}
