//! 디바이스 로그 시그니처 판별
//!
//! 파일 선두 구간에 로그 레벨 마커(`INFO:`)와 `YYYY-MM-DD HH:MM:SS` 형태의
//! 타임스탬프가 모두 있으면 디바이스 로그로 간주합니다.

use std::io::Read;
use std::path::Path;

use regex::Regex;

use crate::error::LogPipelineError;

/// 로그 레벨 마커
pub const LEVEL_MARKER: &str = "INFO:";

const TIMESTAMP_PATTERN: &str = r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}";

/// ZIP 매직 바이트
pub const ZIP_MAGIC: &[u8; 2] = b"PK";

/// 디바이스 로그 시그니처 검사기
#[derive(Debug, Clone)]
pub struct SignatureDetector {
    timestamp: Regex,
    window: usize,
}

impl SignatureDetector {
    /// 선두 `window` 바이트를 검사하는 검사기를 생성합니다.
    pub fn new(window: usize) -> Result<Self, LogPipelineError> {
        Ok(Self {
            timestamp: Regex::new(TIMESTAMP_PATTERN)?,
            window,
        })
    }

    /// 텍스트 선두 구간이 시그니처와 일치하는지 검사합니다.
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        let head = &bytes[..bytes.len().min(self.window)];
        let text = String::from_utf8_lossy(head);
        text.contains(LEVEL_MARKER) && self.timestamp.is_match(&text)
    }

    /// 파일이 디바이스 로그인지 검사합니다. 읽기 실패는 불일치로 처리합니다.
    pub fn matches_file(&self, path: &Path) -> bool {
        match read_head(path, self.window) {
            Ok(head) => self.matches_bytes(&head),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "signature read failed");
                false
            }
        }
    }
}

/// 파일 선두 `len` 바이트를 읽습니다.
pub fn read_head(path: &Path, len: usize) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// 파일이 ZIP 매직 바이트로 시작하는지 검사합니다.
pub fn has_zip_magic(path: &Path) -> bool {
    read_head(path, ZIP_MAGIC.len())
        .map(|head| head.as_slice() == ZIP_MAGIC)
        .unwrap_or(false)
}
