//! Transfer Coordinator - pick a peer, push or pull a file
//!
//! Target resolution works on a registry snapshot:
//! - explicit `ip:port` always wins
//! - no devices: refuse
//! - exactly one device: take it without asking
//! - `-N`: the N-th listed device
//! - anything else: ask the caller's prompt
//!
//! An explicit address names its peer outright and needs no registry lookup,
//! so it is checked before the device-count rules and works with none known.
//!
//! Transfers are single attempts. Retry and timeout policy belong to the caller.

use crate::envelope::{guess_mime_type, FileInfo};
use crate::error::{ChatError, Result};
use crate::registry::{parse_address, Device, DeviceListing};
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Interactive fallback when the target cannot be decided automatically
pub trait TargetPrompt {
    /// Show `devices` and return the raw answer (a 1-based number or `ip:port`)
    fn choose(&self, devices: &[Device]) -> Option<String>;
}

/// Prompt that never answers; resolution then fails with `InvalidSelection`
pub struct NoPrompt;

impl TargetPrompt for NoPrompt {
    fn choose(&self, _devices: &[Device]) -> Option<String> {
        None
    }
}

/// Where a transfer goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    Device(Device),
    Address(SocketAddr),
}

impl TransferTarget {
    pub fn address(&self) -> SocketAddr {
        match self {
            TransferTarget::Device(device) => device.address,
            TransferTarget::Address(addr) => *addr,
        }
    }
}

/// `-N` selector; `None` when `param` is not of that shape
fn parse_index_selector(param: &str) -> Option<i64> {
    param.strip_prefix('-')?.parse().ok()
}

fn pick_by_index(devices: &[Device], index: i64) -> Result<Device> {
    usize::try_from(index)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| devices.get(i).cloned())
        .ok_or(ChatError::IndexOutOfRange {
            index,
            count: devices.len(),
        })
}

/// Resolve an upload target from an optional selector and a registry snapshot
pub fn resolve_target(
    devices: &[Device],
    param: Option<&str>,
    prompt: &dyn TargetPrompt,
) -> Result<TransferTarget> {
    let param = param.map(str::trim).filter(|p| !p.is_empty());

    if let Some(addr) = param.and_then(|p| parse_address(p).ok()) {
        return Ok(TransferTarget::Address(addr));
    }

    match devices {
        [] => return Err(ChatError::NoPeersFound),
        [only] => {
            tracing::info!(device = %only.name, addr = %only.address, "Auto-selected the only online device");
            return Ok(TransferTarget::Device(only.clone()));
        }
        _ => {}
    }

    if let Some(index) = param.and_then(parse_index_selector) {
        return pick_by_index(devices, index).map(TransferTarget::Device);
    }

    let answer = prompt
        .choose(devices)
        .map(|a| a.trim().to_string())
        .ok_or_else(|| ChatError::InvalidSelection("no device chosen".into()))?;

    if let Ok(number) = answer.parse::<i64>() {
        return pick_by_index(devices, number)
            .map(TransferTarget::Device)
            .map_err(|_| ChatError::InvalidSelection(answer));
    }

    if answer.contains(':') {
        return parse_address(&answer)
            .map(TransferTarget::Address)
            .map_err(|_| ChatError::InvalidSelection(answer));
    }

    Err(ChatError::InvalidSelection(answer))
}

/// Reduce a requested file name to a single safe path component
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let component = Path::new(name.trim()).file_name()?.to_str()?;
    if component.is_empty() || component == "." || component == ".." {
        return None;
    }
    Some(component.to_string())
}

/// HTTP client for a peer's file-transfer and device-listing endpoints
pub struct TransferClient {
    client: reqwest::Client,
    download_dir: PathBuf,
}

impl TransferClient {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn endpoint(peer: SocketAddr, segments: &[&str]) -> std::result::Result<Url, String> {
        let mut url = Url::parse(&format!("http://{}/", peer)).map_err(|e| e.to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("cannot build URL for {}", peer))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Push a local file to `POST /file/upload` on `target`
    pub async fn upload(&self, target: SocketAddr, path: &Path) -> Result<FileInfo> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ChatError::FileNotFound(path.to_path_buf()))?;
        let info = FileInfo::new(name.clone(), data.len() as u64, guess_mime_type(path));

        let part = Part::bytes(data)
            .file_name(name)
            .mime_str(&info.mime_type)
            .map_err(|e| ChatError::UploadFailed(e.to_string()))?;
        // Raw file name; the server sanitizes it
        let form = Form::new().percent_encode_noop().part("file", part);

        let url = Self::endpoint(target, &["file", "upload"]).map_err(ChatError::UploadFailed)?;
        let resp = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChatError::UploadFailed(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(ChatError::UploadFailed(format!(
                "{} responded {}",
                target,
                resp.status()
            )));
        }

        tracing::info!(file = %info.name, size = info.size_bytes, %target, "📤 Uploaded");
        Ok(info)
    }

    /// Pull `name` from `GET /file/download/{name}` on `source` into the download dir
    pub async fn download(&self, source: SocketAddr, name: &str) -> Result<PathBuf> {
        let file_name = sanitize_file_name(name)
            .ok_or_else(|| ChatError::DownloadFailed(format!("invalid file name '{}'", name)))?;

        let url = Self::endpoint(source, &["file", "download", &file_name])
            .map_err(ChatError::DownloadFailed)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChatError::DownloadFailed(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(ChatError::DownloadFailed(format!(
                "{} responded {} for {}",
                source,
                resp.status(),
                file_name
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ChatError::DownloadFailed(e.to_string()))?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let dest = self.download_dir.join(&file_name);
        tokio::fs::write(&dest, &body).await?;

        tracing::info!(file = %file_name, size = body.len(), %source, "📥 Downloaded");
        Ok(dest)
    }

    /// Query a peer's `GET /discovery/devices`
    pub async fn list_devices(&self, peer: SocketAddr) -> Result<Vec<DeviceListing>> {
        let url = Self::endpoint(peer, &["discovery", "devices"]).map_err(ChatError::PeerRequest)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChatError::PeerRequest(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ChatError::PeerRequest(format!(
                "{} responded {}",
                peer,
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| ChatError::PeerRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn device(name: &str, addr: &str) -> Device {
        Device::new(name, addr.parse().unwrap())
    }

    fn three_devices() -> Vec<Device> {
        vec![
            device("A", "192.168.1.10:9001"),
            device("B", "192.168.1.11:9002"),
            device("C", "192.168.1.12:9003"),
        ]
    }

    /// Records whether it was asked, answers with a canned reply
    struct Scripted {
        answer: Option<&'static str>,
        asked: Cell<bool>,
    }

    impl Scripted {
        fn new(answer: Option<&'static str>) -> Self {
            Self {
                answer,
                asked: Cell::new(false),
            }
        }
    }

    impl TargetPrompt for Scripted {
        fn choose(&self, _devices: &[Device]) -> Option<String> {
            self.asked.set(true);
            self.answer.map(String::from)
        }
    }

    #[test]
    fn no_devices_is_refused() {
        assert!(matches!(
            resolve_target(&[], None, &NoPrompt),
            Err(ChatError::NoPeersFound)
        ));
        assert!(matches!(
            resolve_target(&[], Some("-1"), &NoPrompt),
            Err(ChatError::NoPeersFound)
        ));
    }

    #[test]
    fn single_device_is_auto_selected() {
        let devices = vec![device("A", "192.168.1.10:9001")];
        let prompt = Scripted::new(Some("2"));

        let target = resolve_target(&devices, None, &prompt).unwrap();
        assert_eq!(target, TransferTarget::Device(devices[0].clone()));
        assert!(!prompt.asked.get());
    }

    #[test]
    fn index_selector_bounds() {
        let devices = three_devices();

        for (i, expected) in devices.iter().enumerate() {
            let selector = format!("-{}", i + 1);
            let target = resolve_target(&devices, Some(&selector), &NoPrompt).unwrap();
            assert_eq!(target, TransferTarget::Device(expected.clone()));
        }

        for selector in ["-0", "-4"] {
            assert!(matches!(
                resolve_target(&devices, Some(selector), &NoPrompt),
                Err(ChatError::IndexOutOfRange { count: 3, .. })
            ));
        }
    }

    #[test]
    fn explicit_address_wins_without_registry() {
        let prompt = Scripted::new(None);
        let target = resolve_target(&[], Some("10.1.2.3:8080"), &prompt).unwrap();
        assert_eq!(target, TransferTarget::Address("10.1.2.3:8080".parse().unwrap()));

        let target = resolve_target(&three_devices(), Some("10.1.2.3:8080"), &prompt).unwrap();
        assert_eq!(target.address(), "10.1.2.3:8080".parse().unwrap());
        assert!(!prompt.asked.get());
    }

    #[test]
    fn prompt_accepts_number_or_address() {
        let devices = three_devices();

        let target = resolve_target(&devices, None, &Scripted::new(Some(" 2 "))).unwrap();
        assert_eq!(target, TransferTarget::Device(devices[1].clone()));

        let target = resolve_target(&devices, Some("laptop"), &Scripted::new(Some("10.0.0.7:5000"))).unwrap();
        assert_eq!(target, TransferTarget::Address("10.0.0.7:5000".parse().unwrap()));
    }

    #[test]
    fn prompt_garbage_is_invalid_selection() {
        let devices = three_devices();
        for answer in [Some("9"), Some("0"), Some("nope"), Some("host:port"), None] {
            assert!(
                matches!(
                    resolve_target(&devices, None, &Scripted::new(answer)),
                    Err(ChatError::InvalidSelection(_))
                ),
                "{answer:?} should be refused"
            );
        }
    }

    #[test]
    fn non_numeric_dash_param_falls_through_to_prompt() {
        let devices = three_devices();
        let prompt = Scripted::new(Some("3"));
        let target = resolve_target(&devices, Some("-x"), &prompt).unwrap();
        assert!(prompt.asked.get());
        assert_eq!(target, TransferTarget::Device(devices[2].clone()));
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("a/b/c.txt").as_deref(), Some("c.txt"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[test]
    fn endpoint_encodes_file_names() {
        let url = TransferClient::endpoint(
            "192.168.1.10:9001".parse().unwrap(),
            &["file", "download", "my report #1.pdf"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://192.168.1.10:9001/file/download/my%20report%20%231.pdf"
        );
    }

    #[tokio::test]
    async fn upload_missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let client = TransferClient::new(dir.path());
        let result = client
            .upload("127.0.0.1:9".parse().unwrap(), &dir.path().join("ghost.txt"))
            .await;
        assert!(matches!(result, Err(ChatError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn download_refuses_bad_names_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let client = TransferClient::new(dir.path());
        let result = client.download("127.0.0.1:9".parse().unwrap(), "..").await;
        assert!(matches!(result, Err(ChatError::DownloadFailed(_))));
    }
}
