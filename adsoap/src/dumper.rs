//! Archivage des échanges SOAP bruts pour diagnostic
//!
//! Chaque échange est rangé sous un chemin dérivé de l'identifiant de
//! requête renvoyé par le serveur (en-tête `RequestId`) :
//!
//! ```text
//! <root>/<id[0:2]>/<id[2:3]>/<id>_req.data
//! <root>/<id[0:2]>/<id[2:3]>/<id>_resp.data
//! ```
//!
//! Les répertoires sont créés en 0775 et les fichiers en 0664 pour que
//! plusieurs processus d'un même groupe puissent partager l'arborescence.

use crate::errors::{AdSoapError, Result};
use crate::exchange::LastExchange;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DIR_MODE: u32 = 0o775;
const FILE_MODE: u32 = 0o664;
const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

static REQUEST_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im-u)^RequestId: ([a-z0-9]+)\r?$").expect("request id pattern is valid")
});

/// Extrait l'identifiant de requête d'un bloc d'en-têtes HTTP
///
/// La recherche est insensible à la casse et porte sur n'importe quelle
/// ligne du bloc. Seuls les caractères alphanumériques ASCII sont admis
/// dans l'identifiant, qui sert de nom de répertoire.
pub fn extract_request_id(headers: &[u8]) -> Option<String> {
    if headers.is_empty() {
        return None;
    }
    REQUEST_ID_RE
        .captures(headers)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Vérifie l'écriture en créant puis supprimant un fichier témoin
fn is_writable(dir: &Path) -> bool {
    let test_file = dir.join(format!(".write_test.{}", std::process::id()));
    match fs::write(&test_file, b"test") {
        Ok(()) => fs::remove_file(&test_file).is_ok(),
        Err(_) => false,
    }
}

/// Crée le répertoire s'il manque (parents compris), sinon vérifie qu'il est
/// accessible en écriture. Un autre processus peut le créer en même temps.
fn ensure_directory_exists(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        if dir.exists() {
            return Err(AdSoapError::NotADirectory(dir.to_path_buf()));
        }

        if let Some(parent) = dir.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_directory_exists(parent)?;
            }
        }

        match fs::create_dir(dir) {
            Ok(()) => {
                set_mode(dir, DIR_MODE).map_err(|source| AdSoapError::CreateDirectory {
                    path: dir.to_path_buf(),
                    source,
                })?;
                debug!(directory=%dir.display(), "Created dump directory");
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(source) => {
                return Err(AdSoapError::CreateDirectory {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        }
    }

    if !is_writable(dir) {
        return Err(AdSoapError::NotWritable(dir.to_path_buf()));
    }

    Ok(())
}

fn save_file(path: &Path, content: &[u8]) -> Result<()> {
    fs::write(path, content)
        .and_then(|_| set_mode(path, FILE_MODE))
        .map_err(|source| AdSoapError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
}

fn validate_request_id(request_id: &str) -> Result<()> {
    if request_id.is_empty() {
        return Err(AdSoapError::invalid_argument(
            "The request ID cannot be empty.",
        ));
    }
    if request_id.starts_with('.') || request_id.contains(['/', '\\', '\0']) {
        return Err(AdSoapError::InvalidArgument(format!(
            "The request ID \"{}\" cannot be used as a path component.",
            request_id
        )));
    }
    Ok(())
}

fn join_exchange(headers: &[u8], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(headers.len() + HEADER_SEPARATOR.len() + body.len());
    data.extend_from_slice(headers);
    data.extend_from_slice(HEADER_SEPARATOR);
    data.extend_from_slice(body);
    data
}

/// Archiveur d'échanges SOAP
///
/// Construit explicitement avec son répertoire racine puis passé aux
/// clients qui en ont besoin ; il ne garde aucun autre état.
#[derive(Debug, Clone)]
pub struct Dumper {
    root_dir: PathBuf,
}

impl Dumper {
    /// Crée un archiveur sur `root_dir`
    ///
    /// Le répertoire est créé s'il n'existe pas.
    ///
    /// # Errors
    ///
    /// Erreur de stockage si le répertoire ne peut être créé ou n'est pas
    /// accessible en écriture.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        ensure_directory_exists(&root_dir)?;
        info!(directory=%root_dir.display(), "SOAP dumper ready");
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn shard_dir(&self, request_id: &str) -> PathBuf {
        let mut dir = self.root_dir.clone();
        dir.push(request_id.chars().take(2).collect::<String>());
        if let Some(c) = request_id.chars().nth(2) {
            dir.push(c.to_string());
        }
        dir
    }

    /// Chemins (requête, réponse) utilisés pour `request_id`
    pub fn paths_for(&self, request_id: &str) -> Result<(PathBuf, PathBuf)> {
        validate_request_id(request_id)?;
        let dir = self.shard_dir(request_id);
        Ok((
            dir.join(format!("{}_req.data", request_id)),
            dir.join(format!("{}_resp.data", request_id)),
        ))
    }

    /// Écrit la requête et la réponse d'un échange
    ///
    /// Les fichiers existants sont écrasés. Retourne les chemins écrits.
    pub fn dump(
        &self,
        request_id: &str,
        request: &[u8],
        response: &[u8],
    ) -> Result<(PathBuf, PathBuf)> {
        let (request_path, response_path) = self.paths_for(request_id)?;

        ensure_directory_exists(&self.shard_dir(request_id))?;

        save_file(&request_path, request)?;
        save_file(&response_path, response)?;

        debug!(request_id, path=%request_path.display(), "Dumped SOAP exchange");
        Ok((request_path, response_path))
    }

    /// Archive le dernier échange de `client`
    ///
    /// Sans en-tête `RequestId` dans la réponse, rien n'est écrit et
    /// `Ok(None)` est retourné. Les erreurs de stockage sont propagées.
    pub fn dump_last_request<C>(&self, client: &C) -> Result<Option<(PathBuf, PathBuf)>>
    where
        C: LastExchange + ?Sized,
    {
        let Some(request_id) = extract_request_id(client.last_response_headers()) else {
            debug!("No RequestId header in last response, nothing dumped");
            return Ok(None);
        };

        let request = join_exchange(client.last_request_headers(), client.last_request());
        let response = join_exchange(client.last_response_headers(), client.last_response());

        self.dump(&request_id, &request, &response).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_request_id() {
        let headers = b"HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nRequestId: 8695244274068608439\r\nUnits: 10/20828/64000\r\n";
        assert_eq!(
            extract_request_id(headers),
            Some("8695244274068608439".to_string())
        );
    }

    #[test]
    fn test_extract_request_id_is_case_insensitive() {
        assert_eq!(
            extract_request_id(b"requestid: AbC123"),
            Some("AbC123".to_string())
        );
    }

    #[test]
    fn test_extract_request_id_absent() {
        assert_eq!(extract_request_id(b""), None);
        assert_eq!(extract_request_id(b"HTTP/1.1 200 OK\r\nX-RequestId: abc\r\n"), None);
        // la valeur doit être alphanumérique jusqu'à la fin de ligne
        assert_eq!(extract_request_id(b"RequestId: ab-cd\r\n"), None);
    }

    #[test]
    fn test_extract_request_id_is_ascii_only() {
        // chiffre arabo-indien et signe kelvin (U+212A)
        let headers = "RequestId: ab\u{0661}\u{212A}\r\n";
        assert_eq!(extract_request_id(headers.as_bytes()), None);
        assert_eq!(extract_request_id("RequestId: \u{212A}\r\n".as_bytes()), None);
    }

    #[test]
    fn test_is_writable() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(is_writable(temp_dir.path()));
        assert!(!is_writable(&temp_dir.path().join("missing")));
        // le fichier témoin ne reste pas
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_validate_request_id() {
        assert!(matches!(
            validate_request_id(""),
            Err(AdSoapError::InvalidArgument(_))
        ));
        assert!(validate_request_id("../etc").is_err());
        assert!(validate_request_id("ab/cd").is_err());
        assert!(validate_request_id("abcd").is_ok());
    }

    #[test]
    fn test_join_exchange() {
        assert_eq!(join_exchange(b"H: 1", b"<x/>"), b"H: 1\r\n\r\n<x/>".to_vec());
    }
}
