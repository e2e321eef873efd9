//! `./logs/<startTime>/` readers for the `/api/history/*` surface (root spec
//! §4.9: "404 if missing, 500 on other I/O errors").

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::response::ApiError;

fn session_dir(logs_dir: &Path, ts: &str) -> Result<PathBuf, ApiError> {
    if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::NotFound);
    }
    Ok(logs_dir.join(ts))
}

/// Sorted list of directory names under `./logs/` matching `^\d+$`.
pub fn list_sessions(logs_dir: &Path) -> Result<Vec<String>, ApiError> {
    if !logs_dir.exists() {
        return Ok(Vec::new());
    }
    let mut sessions = Vec::new();
    let read_dir = std::fs::read_dir(logs_dir).map_err(|err| ApiError::Internal(err.into()))?;
    for entry in read_dir {
        let entry = entry.map_err(|err| ApiError::Internal(err.into()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            sessions.push(name);
        }
    }
    sessions.sort_by_key(|name| name.parse::<u64>().unwrap_or(u64::MAX));
    Ok(sessions)
}

fn read_file(path: &Path) -> Result<String, ApiError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound),
        Err(err) => Err(ApiError::Internal(err.into())),
    }
}

pub fn read_json(logs_dir: &Path, ts: &str, relative: &str) -> Result<serde_json::Value, ApiError> {
    let path = session_dir(logs_dir, ts)?.join(relative);
    let raw = read_file(&path)?;
    serde_json::from_str(&raw).map_err(|err| ApiError::Internal(err.into()))
}

pub fn download_fight_log(logs_dir: &Path, ts: &str) -> Result<Response, ApiError> {
    let path = session_dir(logs_dir, ts)?.join("fight.log");
    let raw = read_file(&path)?;
    let response = (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{ts}-fight.log\"")),
        ],
        Body::from(raw),
    );
    Ok(response.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dir_rejects_non_numeric_ts() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(session_dir(dir.path(), "../etc"), Err(ApiError::NotFound)));
        assert!(matches!(session_dir(dir.path(), ""), Err(ApiError::NotFound)));
        assert!(session_dir(dir.path(), "12345").is_ok());
    }

    #[test]
    fn list_sessions_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("200")).unwrap();
        std::fs::create_dir(dir.path().join("100")).unwrap();
        std::fs::create_dir(dir.path().join("not-a-timestamp")).unwrap();
        let sessions = list_sessions(dir.path()).unwrap();
        assert_eq!(sessions, vec!["100".to_string(), "200".to_string()]);
    }

    #[test]
    fn read_json_404s_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("100")).unwrap();
        assert!(matches!(read_json(dir.path(), "100", "summary.json"), Err(ApiError::NotFound)));
    }
}
