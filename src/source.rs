use std::fmt;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use tempfile::NamedTempFile;

use crate::config::SourceConfig;
use crate::error::{Result, WaveformError};

/// Where the audio for an asset lives.
#[derive(Clone, PartialEq, Eq)]
pub enum AudioReference {
    LocalPath(PathBuf),
    /// Web-relative or absolute path as stored by the web app, e.g.
    /// `/media/tracks/a.mp3`.
    Url(String),
    Remote(Url),
    Bytes(Vec<u8>),
}

const WEB_PREFIXES: &[&str] = &["/media/", "/static/", "/uploads/"];

impl AudioReference {
    /// Classify a user-supplied string by its shape alone. Rooted paths are
    /// treated as stored references; `locate` still tries them verbatim first.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            if let Ok(url) = Url::parse(trimmed) {
                return AudioReference::Remote(url);
            }
        }
        if WEB_PREFIXES.iter().any(|p| trimmed.starts_with(p)) || Path::new(trimmed).has_root() {
            return AudioReference::Url(trimmed.to_string());
        }
        AudioReference::LocalPath(PathBuf::from(trimmed))
    }
}

impl fmt::Debug for AudioReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioReference::LocalPath(p) => write!(f, "LocalPath({})", p.display()),
            AudioReference::Url(u) => write!(f, "Url({})", u),
            AudioReference::Remote(u) => write!(f, "Remote({})", u),
            AudioReference::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
        }
    }
}

impl fmt::Display for AudioReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioReference::LocalPath(p) => write!(f, "{}", p.display()),
            AudioReference::Url(u) => f.write_str(u),
            AudioReference::Remote(u) => write!(f, "{}", u),
            AudioReference::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// A file the decoders can open. Temp-backed sources delete their file on drop.
#[derive(Debug)]
pub enum LocatedSource {
    Path(PathBuf),
    Temp(NamedTempFile),
}

impl LocatedSource {
    pub fn path(&self) -> &Path {
        match self {
            LocatedSource::Path(p) => p,
            LocatedSource::Temp(t) => t.path(),
        }
    }
}

pub struct SourceLocator {
    storage_roots: Vec<PathBuf>,
    fetch_timeout: Duration,
    max_bytes: usize,
    chunk_size: usize,
}

impl SourceLocator {
    pub fn from_config(cfg: &SourceConfig) -> Self {
        Self {
            storage_roots: cfg.storage_roots.clone(),
            fetch_timeout: Duration::from_secs(cfg.fetch_timeout_secs),
            max_bytes: cfg.max_fetch_bytes,
            chunk_size: cfg.chunk_size.max(1),
        }
    }

    pub fn locate(&self, reference: &AudioReference) -> Result<LocatedSource> {
        match reference {
            AudioReference::LocalPath(path) => self.find_on_disk(&path.to_string_lossy()),
            AudioReference::Url(url) => self.find_on_disk(url),
            AudioReference::Remote(url) => {
                let body = self.fetch(url)?;
                let ext = sniff_extension(&body).or_else(|| url_extension(url));
                spill_to_temp(&body, ext)
            }
            AudioReference::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(WaveformError::SourceNotFound("empty byte buffer".into()));
                }
                spill_to_temp(bytes, sniff_extension(bytes))
            }
        }
    }

    /// Every path a stored reference might live at, in priority order.
    pub fn candidates(&self, reference: &str) -> Vec<PathBuf> {
        let mut out = vec![PathBuf::from(reference)];
        let relative = reference.trim_start_matches('/');
        if relative.is_empty() {
            return out;
        }
        let rel_path = Path::new(relative);
        let without_first: PathBuf = rel_path
            .components()
            .skip(1)
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();

        for root in &self.storage_roots {
            out.push(root.join(rel_path));
            if !without_first.as_os_str().is_empty() {
                out.push(root.join(&without_first));
            }
        }
        out.dedup();
        out
    }

    fn find_on_disk(&self, reference: &str) -> Result<LocatedSource> {
        let candidates = self.candidates(reference);
        for candidate in &candidates {
            if candidate.is_file() {
                log::debug!("Resolved {} to {}", reference, candidate.display());
                return Ok(LocatedSource::Path(candidate.clone()));
            }
        }
        let tried: Vec<String> = candidates.iter().map(|c| c.display().to_string()).collect();
        Err(WaveformError::SourceNotFound(format!(
            "{} (tried {})",
            reference,
            tried.join(", ")
        )))
    }

    /// Streamed GET, truncated at the configured byte cap.
    pub fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let network = |reason: String| WaveformError::Network {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.fetch_timeout)
            .build()
            .map_err(|e| network(e.to_string()))?;

        let response = client
            .get(url.clone())
            .send()
            .map_err(|e| network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WaveformError::SourceNotFound(format!("{} returned {}", url, status)));
        }

        let body = read_capped(response, self.max_bytes, self.chunk_size)
            .map_err(|e| network(e.to_string()))?;
        log::info!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// Read `reader` in `chunk_size` pieces, stopping once `max_bytes` have been
/// collected. The result never exceeds `max_bytes`.
pub fn read_capped<R: Read>(mut reader: R, max_bytes: usize, chunk_size: usize) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        body.extend_from_slice(&chunk[..n]);
        if body.len() >= max_bytes {
            log::warn!("Download reached {} byte cap; truncating", max_bytes);
            body.truncate(max_bytes);
            break;
        }
    }
    Ok(body)
}

/// Guess a file extension from the first bytes of a buffer.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [b'R', b'I', b'F', b'F', ..] => Some("wav"),
        [b'f', b'L', b'a', b'C', ..] => Some("flac"),
        [b'O', b'g', b'g', b'S', ..] => Some("ogg"),
        [b'I', b'D', b'3', ..] => Some("mp3"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("m4a"),
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => {
            // ADTS AAC shares the sync word; layer bits 00 mean AAC
            if second & 0x06 == 0 {
                Some("aac")
            } else {
                Some("mp3")
            }
        }
        _ => None,
    }
}

fn url_extension(url: &Url) -> Option<&'static str> {
    let ext = Path::new(url.path()).extension()?.to_str()?.to_ascii_lowercase();
    ["mp3", "wav", "flac", "ogg", "m4a", "aac", "mp4"]
        .into_iter()
        .find(|known| *known == ext)
}

fn spill_to_temp(bytes: &[u8], ext: Option<&str>) -> Result<LocatedSource> {
    let suffix = ext.map(|e| format!(".{}", e)).unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("barform-")
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    log::debug!("Spilled {} bytes to {}", bytes.len(), file.path().display());
    Ok(LocatedSource::Temp(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::TcpListener;
    use std::thread;

    /// Answer a single GET on a loopback port with `status` and a body of
    /// `body_len` bytes.
    fn serve_once(status: &'static str, body_len: usize) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status, body_len
            );
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            let chunk = vec![0x55u8; 64 * 1024];
            let mut left = body_len;
            while left > 0 {
                let n = left.min(chunk.len());
                // the client hangs up once it has read enough
                if stream.write_all(&chunk[..n]).is_err() {
                    return;
                }
                left -= n;
            }
        });
        Url::parse(&format!("http://{}/track.mp3", addr)).unwrap()
    }

    fn locator(roots: Vec<PathBuf>) -> SourceLocator {
        SourceLocator::from_config(&SourceConfig {
            storage_roots: roots,
            ..SourceConfig::default()
        })
    }

    #[test]
    fn parses_reference_kinds() {
        assert!(matches!(
            AudioReference::parse("https://cdn.example.com/a.mp3"),
            AudioReference::Remote(_)
        ));
        assert!(matches!(
            AudioReference::parse("/media/tracks/a.mp3"),
            AudioReference::Url(_)
        ));
        assert!(matches!(
            AudioReference::parse("songs/a.mp3"),
            AudioReference::LocalPath(_)
        ));
    }

    #[test]
    fn parse_does_not_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.wav");
        std::fs::write(&file, b"x").unwrap();
        let input = file.to_string_lossy().into_owned();

        let reference = AudioReference::parse(&input);
        assert_eq!(reference, AudioReference::parse(&format!("  {}  ", input)));
        assert!(matches!(reference, AudioReference::Url(_)));

        let found = locator(vec![]).locate(&reference).unwrap();
        assert_eq!(found.path(), file.as_path());
    }

    #[test]
    fn sniffs_common_containers() {
        assert_eq!(sniff_extension(b"RIFF\x24\x00\x00\x00WAVEfmt "), Some("wav"));
        assert_eq!(sniff_extension(b"fLaC\x00\x00"), Some("flac"));
        assert_eq!(sniff_extension(b"OggS\x00\x02"), Some("ogg"));
        assert_eq!(sniff_extension(b"ID3\x04\x00"), Some("mp3"));
        assert_eq!(sniff_extension(&[0xFF, 0xFB, 0x90, 0x64]), Some("mp3"));
        assert_eq!(sniff_extension(&[0xFF, 0xF1, 0x50, 0x80]), Some("aac"));
        assert_eq!(sniff_extension(b"\x00\x00\x00\x20ftypM4A "), Some("m4a"));
        assert_eq!(sniff_extension(b"hello"), None);
        assert_eq!(sniff_extension(b""), None);
    }

    #[test]
    fn direct_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"x").unwrap();
        let loc = locator(vec![]);
        let found = loc.locate(&AudioReference::LocalPath(file.clone())).unwrap();
        assert_eq!(found.path(), file.as_path());
    }

    #[test]
    fn web_path_resolves_under_storage_roots() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("static");
        let second = dir.path().join("srv").join("media");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(second.join("tracks")).unwrap();
        std::fs::write(second.join("tracks").join("song.mp3"), b"x").unwrap();

        let loc = locator(vec![first, second.clone()]);
        let found = loc
            .locate(&AudioReference::Url("/media/tracks/song.mp3".into()))
            .unwrap();
        assert_eq!(found.path(), second.join("tracks").join("song.mp3").as_path());
    }

    #[test]
    fn first_existing_root_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        for root in [&a, &b] {
            std::fs::create_dir_all(root.join("media")).unwrap();
            std::fs::write(root.join("media").join("x.wav"), b"x").unwrap();
        }
        let loc = locator(vec![a.clone(), b]);
        let found = loc.locate(&AudioReference::Url("/media/x.wav".into())).unwrap();
        assert_eq!(found.path(), a.join("media").join("x.wav").as_path());
    }

    #[test]
    fn missing_file_lists_candidates() {
        let loc = locator(vec![PathBuf::from("/nonexistent-root")]);
        let err = loc
            .locate(&AudioReference::Url("/media/gone.mp3".into()))
            .unwrap_err();
        match err {
            WaveformError::SourceNotFound(msg) => {
                assert!(msg.contains("/nonexistent-root/media/gone.mp3"));
                assert!(msg.contains("/nonexistent-root/gone.mp3"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn bytes_are_spilled_and_cleaned_up() {
        let loc = locator(vec![]);
        let wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
        let located = loc.locate(&AudioReference::Bytes(wav.clone())).unwrap();
        let path = located.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("wav"));
        assert_eq!(std::fs::read(&path).unwrap(), wav);
        drop(located);
        assert!(!path.exists());
    }

    #[test]
    fn empty_bytes_are_not_found() {
        let loc = locator(vec![]);
        let err = loc.locate(&AudioReference::Bytes(Vec::new())).unwrap_err();
        assert!(matches!(err, WaveformError::SourceNotFound(_)));
    }

    #[test]
    fn capped_read_truncates_large_bodies() {
        let fifty_mib = 50 * 1024 * 1024;
        let cap = 10 * 1024 * 1024;
        let reader = io::repeat(7).take(fifty_mib);
        let body = read_capped(reader, cap, 8 * 1024).unwrap();
        assert_eq!(body.len(), cap);
    }

    #[test]
    fn capped_read_keeps_small_bodies() {
        let body = read_capped(io::Cursor::new(vec![1u8; 1000]), 4096, 300).unwrap();
        assert_eq!(body.len(), 1000);
    }

    #[test]
    fn not_found_response_is_source_not_found() {
        let url = serve_once("404 Not Found", 9);
        let loc = locator(vec![]);
        let err = loc.fetch(&url).unwrap_err();
        assert!(matches!(err, WaveformError::SourceNotFound(ref msg) if msg.contains("404")));
    }

    #[test]
    fn oversized_remote_body_is_truncated_at_cap() {
        let url = serve_once("200 OK", 50 * 1024 * 1024);
        let loc = locator(vec![]);
        let body = loc.fetch(&url).unwrap();
        assert_eq!(body.len(), 10 * 1024 * 1024);
        assert!(body.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn small_remote_body_is_spilled_with_url_extension() {
        let url = serve_once("200 OK", 2048);
        let loc = locator(vec![]);
        let located = loc.locate(&AudioReference::Remote(url)).unwrap();
        let path = located.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp3"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2048);
        drop(located);
        assert!(!path.exists());
    }

    #[test]
    fn unreachable_host_is_a_network_error() {
        let loc = SourceLocator::from_config(&SourceConfig {
            fetch_timeout_secs: 2,
            ..SourceConfig::default()
        });
        let url = Url::parse("http://127.0.0.1:9/track.mp3").unwrap();
        let err = loc.locate(&AudioReference::Remote(url)).unwrap_err();
        assert!(matches!(err, WaveformError::Network { .. }));
    }
}
