//! Multipart uploads and binary downloads

use crate::backend::{FilePart, HttpResponse, MultipartForm};
use base64::Engine as _;
use definitions::{scalar_to_string, ModuleError, NormalizedArguments, Result};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Body parameter naming the local file to upload
pub const FILEPATH_PARAM: &str = "filepath";
/// Body parameter overriding the uploaded file name
pub const FILENAME_PARAM: &str = "filename";

/// Whether the body asks for a multipart upload
pub fn is_upload(body: Option<&Value>) -> bool {
    body.and_then(|b| b.get(FILEPATH_PARAM))
        .map(Value::is_string)
        .unwrap_or(false)
}

/// Build a multipart form from a body carrying `filepath`
///
/// The file becomes the `file` part; every other field is a text part.
pub async fn build_upload(body: &Map<String, Value>) -> Result<MultipartForm> {
    let filepath = body
        .get(FILEPATH_PARAM)
        .and_then(Value::as_str)
        .ok_or_else(|| ModuleError::missing_required("upload", &[FILEPATH_PARAM.to_string()]))?;

    let content = tokio::fs::read(filepath)
        .await
        .map_err(|e| ModuleError::transport(format!("cannot read upload file {}: {}", filepath, e)))?;

    let file_name = body
        .get(FILENAME_PARAM)
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| {
            Path::new(filepath)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "upload.bin".to_string());

    debug!(file = %file_name, bytes = content.len(), "prepared multipart upload");

    let text = body
        .iter()
        .filter(|(name, _)| name.as_str() != FILEPATH_PARAM && name.as_str() != FILENAME_PARAM)
        .map(|(name, value)| (name.clone(), scalar_to_string(value)))
        .collect();

    Ok(MultipartForm {
        text,
        file: Some(FilePart {
            field: "file".to_string(),
            file_name,
            content,
            content_type: "application/octet-stream".to_string(),
        }),
    })
}

/// File name from a `Content-Disposition` header
pub fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = value.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Last path component of a controller-supplied name
///
/// Separators of either style are stripped; `.` and `..` yield nothing.
pub fn safe_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        _ => Some(base.to_string()),
    }
}

/// Turn a binary response into `{filename, dirpath, path, data}`
///
/// The file is written only when `save_file` is set and a `dirpath` given,
/// and always directly inside `dirpath`.
/// `data` is the text when it is valid UTF-8, otherwise base64.
pub async fn download_result(
    response: &HttpResponse,
    url: &Url,
    args: &NormalizedArguments,
) -> Result<Value> {
    let filename = response
        .header("content-disposition")
        .and_then(disposition_filename)
        .and_then(|name| safe_file_name(&name))
        .or_else(|| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .and_then(safe_file_name)
        })
        .unwrap_or_else(|| "download".to_string());

    let dirpath = args.local_str("dirpath").map(String::from);
    let path = dirpath
        .as_ref()
        .map(|dir| PathBuf::from(dir).join(&filename));

    if args.local_flag("save_file") {
        let target = path.as_ref().ok_or_else(|| {
            ModuleError::missing_required("download", &["dirpath".to_string()])
        })?;
        tokio::fs::write(target, &response.body).await.map_err(|e| {
            ModuleError::transport(format!("failed to write {}: {}", target.display(), e))
        })?;
        debug!(path = %target.display(), bytes = response.body.len(), "saved download");
    }

    let data = match std::str::from_utf8(&response.body) {
        Ok(text) => text.to_string(),
        Err(_) => base64::engine::general_purpose::STANDARD.encode(&response.body),
    };

    Ok(json!({
        "filename": filename,
        "dirpath": dirpath,
        "path": path.map(|p| p.display().to_string()),
        "data": data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use definitions::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename(r#"attachment; filename="config.txt""#),
            Some("config.txt".to_string())
        );
        assert_eq!(
            disposition_filename("attachment; FILENAME=a.bin"),
            Some("a.bin".to_string())
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[test]
    fn test_is_upload() {
        assert!(is_upload(Some(&json!({"filepath": "/tmp/x"}))));
        assert!(!is_upload(Some(&json!({"name": "x"}))));
        assert!(!is_upload(None));
    }

    #[tokio::test]
    async fn test_build_upload() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("image.bin");
        std::fs::write(&file, b"firmware").unwrap();

        let body = json!({
            "filepath": file.display().to_string(),
            "isThirdParty": false
        });
        let form = build_upload(body.as_object().unwrap()).await.unwrap();

        let part = form.file.unwrap();
        assert_eq!(part.field, "file");
        assert_eq!(part.file_name, "image.bin");
        assert_eq!(part.content, b"firmware");
        assert_eq!(form.text, vec![("isThirdParty".to_string(), "false".to_string())]);
    }

    #[tokio::test]
    async fn test_build_upload_missing_file() {
        let body = json!({"filepath": "/no/such/file.bin"});
        let err = build_upload(body.as_object().unwrap()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError);
        assert!(err.message.contains("/no/such/file.bin"));
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("running.cfg"), Some("running.cfg".to_string()));
        assert_eq!(safe_file_name("../escaped.txt"), Some("escaped.txt".to_string()));
        assert_eq!(safe_file_name("/etc/passwd"), Some("passwd".to_string()));
        assert_eq!(safe_file_name(r"..\boot.ini"), Some("boot.ini".to_string()));
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("dir/"), None);
    }

    #[tokio::test]
    async fn test_download_stays_inside_dirpath() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("downloads");
        std::fs::create_dir(&dir).unwrap();
        let response = HttpResponse::new(200)
            .with_header("Content-Disposition", r#"attachment; filename="../escaped.txt""#)
            .with_body("payload");
        let url = Url::parse("https://dnac.example.com/dna/intent/api/v1/file/abc").unwrap();

        let mut args = NormalizedArguments::default();
        args.local
            .insert("dirpath".to_string(), json!(dir.display().to_string()));
        args.local.insert("save_file".to_string(), json!(true));

        let result = download_result(&response, &url, &args).await.unwrap();
        assert_eq!(result["filename"], "escaped.txt");
        assert!(dir.join("escaped.txt").exists());
        assert!(!root.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn test_download_dot_dot_name_falls_back_to_url() {
        let response = HttpResponse::new(200)
            .with_header("Content-Disposition", r#"attachment; filename="..""#)
            .with_body("x");
        let url = Url::parse("https://dnac.example.com/file/blob.bin").unwrap();

        let result = download_result(&response, &url, &NormalizedArguments::default())
            .await
            .unwrap();
        assert_eq!(result["filename"], "blob.bin");
    }

    #[tokio::test]
    async fn test_download_saves_file() {
        let dir = TempDir::new().unwrap();
        let response = HttpResponse::new(200)
            .with_header("Content-Disposition", r#"attachment; filename="running.cfg""#)
            .with_body("hostname edge-1\n");
        let url = Url::parse("https://dnac.example.com/dna/intent/api/v1/file/abc").unwrap();

        let mut args = NormalizedArguments::default();
        args.local
            .insert("dirpath".to_string(), json!(dir.path().display().to_string()));
        args.local.insert("save_file".to_string(), json!(true));

        let result = download_result(&response, &url, &args).await.unwrap();
        assert_eq!(result["filename"], "running.cfg");
        assert_eq!(result["data"], "hostname edge-1\n");

        let saved = std::fs::read_to_string(dir.path().join("running.cfg")).unwrap();
        assert_eq!(saved, "hostname edge-1\n");
    }

    #[tokio::test]
    async fn test_download_binary_is_base64() {
        let response = HttpResponse::new(200).with_body(vec![0xff, 0xfe]);
        let url = Url::parse("https://dnac.example.com/file/blob.bin").unwrap();

        let result = download_result(&response, &url, &NormalizedArguments::default())
            .await
            .unwrap();
        assert_eq!(result["filename"], "blob.bin");
        assert_eq!(result["data"], "//4=");
        assert!(result["path"].is_null());
    }
}
