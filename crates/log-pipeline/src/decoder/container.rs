//! 형식 판별과 폴백 체인
//!
//! 판별 순서:
//! 1. `.plaud`인데 ZIP 매직으로 시작 → 아카이브 경로
//! 2. `.plaud` → 복호화 → ZIP 확인 → 추출 → `plaud.log` 또는 비어 있지 않은 `.log`
//! 3. `.zip` 또는 ZIP 매직 → 추출(라이브러리, 실패 시 외부 unzip) 후
//!    중첩 컨테이너 → 시그니처 `.log` → `.log.gz` → 전체 `.log` 병합
//! 4. `.log` → 시그니처 일치 시 통과, 아니면 `format_suspect`로 통과
//! 5. 알 수 없는 확장자 → 시그니처 일치 시 통과, 아니면 실패

use std::path::{Path, PathBuf};

use metrics::counter;

use logtriage_core::metrics as m;

use super::archive::{
    extract_zip_bytes, extract_zip_external, extract_zip_file, find_files, gunzip_file,
    has_suffix, merge_logs,
};
use super::cipher::decrypt_container;
use super::signature::{SignatureDetector, ZIP_MAGIC, has_zip_magic};
use super::{DecodeOutcome, LogCorpus};
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;

/// 독자 컨테이너 확장자
pub const CONTAINER_EXTENSION: &str = ".plaud";

/// 컨테이너 안의 정식 로그 파일 이름
pub const CANONICAL_LOG_NAME: &str = "plaud.log";

/// 복호화 결과가 ZIP이 아닐 때의 사유
pub const INVALID_ARCHIVE_REASON: &str = "decrypt produced invalid archive";

/// 컨테이너 디코더
#[derive(Debug, Clone)]
pub struct ContainerDecoder {
    config: PipelineConfig,
    signature: SignatureDetector,
}

impl ContainerDecoder {
    /// 설정으로 디코더를 생성합니다.
    pub fn new(config: PipelineConfig) -> Result<Self, LogPipelineError> {
        config.validate()?;
        let signature = SignatureDetector::new(config.signature_window_bytes)?;
        Ok(Self { config, signature })
    }

    /// 시그니처 검사기
    pub fn signature(&self) -> &SignatureDetector {
        &self.signature
    }

    /// 입력 파일 하나를 처리합니다.
    ///
    /// 중간 산출물은 `work_dir` 아래에 생성됩니다.
    pub async fn process(&self, file: &Path, work_dir: &Path) -> DecodeOutcome {
        counter!(m::DECODER_FILES_TOTAL).increment(1);
        let outcome = self.detect_and_decode(file, work_dir).await;

        match (&outcome.log_path, &outcome.reason) {
            (Some(path), None) => {
                tracing::debug!(input = %file.display(), log = %path.display(), "decoded");
            }
            (Some(path), Some(reason)) => {
                tracing::warn!(
                    input = %file.display(),
                    log = %path.display(),
                    reason = reason.as_str(),
                    "passing through suspect log"
                );
            }
            (None, reason) => {
                counter!(m::DECODER_FAILURES_TOTAL).increment(1);
                tracing::warn!(
                    input = %file.display(),
                    reason = reason.as_deref().unwrap_or(""),
                    "no usable log"
                );
            }
        }
        outcome
    }

    /// 입력 파일 전체를 처리하여 로그 모음을 만듭니다.
    pub async fn decode_all(&self, files: &[PathBuf], work_dir: &Path) -> LogCorpus {
        let mut corpus = LogCorpus::default();
        for file in files {
            let outcome = self.process(file, work_dir).await;
            if let Some(path) = outcome.log_path {
                if !corpus.logs.contains(&path) {
                    corpus.logs.push(path);
                }
            }
            if let (true, Some(reason)) = (outcome.format_suspect, outcome.reason) {
                corpus
                    .diagnostics
                    .push(format!("{}: {reason}", display_name(file)));
            }
        }
        corpus
    }

    async fn detect_and_decode(&self, file: &Path, work_dir: &Path) -> DecodeOutcome {
        let name = display_name(file).to_ascii_lowercase();
        let zip_magic = {
            let file = file.to_path_buf();
            run_blocking(move || has_zip_magic(&file)).await.unwrap_or(false)
        };

        if name.ends_with(CONTAINER_EXTENSION) {
            if zip_magic {
                // 재압축 후 이름만 바꾼 아카이브
                return self.process_zip(file, work_dir).await;
            }
            let out_dir = work_dir.join(format!("{}_decrypted", file_stem(file)));
            let input = file.to_path_buf();
            return match run_blocking(move || decrypt_to_log(&input, &out_dir)).await {
                Ok(Ok(path)) => DecodeOutcome::usable(path),
                Ok(Err(reason)) => DecodeOutcome::failed(reason),
                Err(e) => DecodeOutcome::failed(e.to_string()),
            };
        }

        if name.ends_with(".zip") || zip_magic {
            return self.process_zip(file, work_dir).await;
        }

        let signature = self.signature.clone();
        let input = file.to_path_buf();
        let matches = run_blocking(move || signature.matches_file(&input))
            .await
            .unwrap_or(false);

        if matches {
            return DecodeOutcome::usable(file.to_path_buf());
        }
        if name.ends_with(".log") {
            return DecodeOutcome::suspect(
                file.to_path_buf(),
                "log file does not match the device-log signature",
            );
        }
        DecodeOutcome::failed(format!("unrecognized file format: {}", display_name(file)))
    }

    async fn process_zip(&self, file: &Path, work_dir: &Path) -> DecodeOutcome {
        let stem = file_stem(file);
        let extract_dir = work_dir.join(format!("{stem}_unzipped"));

        let lib_result = {
            let input = file.to_path_buf();
            let dest = extract_dir.clone();
            run_blocking(move || extract_zip_file(&input, &dest)).await
        };
        let lib_error = match lib_result {
            Ok(Ok(count)) => {
                tracing::debug!(input = %file.display(), entries = count, "zip extracted");
                None
            }
            Ok(Err(e)) | Err(e) => Some(e),
        };

        if let Some(lib_error) = lib_error {
            tracing::warn!(
                input = %file.display(),
                error = %lib_error,
                "zip library failed, trying external unzip"
            );
            if let Err(tool_error) = extract_zip_external(
                &self.config.unzip_program,
                file,
                &extract_dir,
                self.config.unzip_timeout(),
            )
            .await
            {
                return DecodeOutcome::failed(format!(
                    "zip extraction failed: {lib_error}; unzip fallback failed: {tool_error}"
                ));
            }
        }

        let signature = self.signature.clone();
        let merged_dest = work_dir.join(format!("{stem}_merged_logs.log"));
        match run_blocking(move || search_extracted(&signature, &extract_dir, &merged_dest)).await
        {
            Ok(outcome) => outcome,
            Err(e) => DecodeOutcome::failed(e.to_string()),
        }
    }
}

/// 추출된 트리에서 로그를 찾습니다.
fn search_extracted(signature: &SignatureDetector, root: &Path, merged_dest: &Path) -> DecodeOutcome {
    // (a) 중첩 컨테이너: 첫 번째 것만 복호화
    if let Some(nested) = find_files(root, |p| has_suffix(p, CONTAINER_EXTENSION))
        .into_iter()
        .next()
    {
        let parent = nested.parent().unwrap_or(root);
        let out_dir = parent.join(format!("{}_decrypted", file_stem(&nested)));
        return match decrypt_to_log(&nested, &out_dir) {
            Ok(path) => DecodeOutcome::usable(path),
            Err(reason) => DecodeOutcome::failed(format!(
                "nested container {} failed to decrypt: {reason}",
                display_name(&nested)
            )),
        };
    }

    // (b) 시그니처가 맞는 .log
    if let Some(path) = find_files(root, |p| has_suffix(p, ".log"))
        .into_iter()
        .find(|p| signature.matches_file(p))
    {
        return DecodeOutcome::usable(path);
    }

    // (c) .log.gz 해제 후 재검사
    for gz in find_files(root, |p| has_suffix(p, ".log.gz")) {
        match gunzip_file(&gz) {
            Ok(out) if signature.matches_file(&out) => return DecodeOutcome::usable(out),
            Ok(_) => {}
            Err(e) => tracing::warn!(path = %gz.display(), error = %e, "failed to decompress"),
        }
    }

    // (d) 모든 .log 병합
    let logs = find_files(root, |p| has_suffix(p, ".log"));
    if !logs.is_empty() {
        match merge_logs(&logs, root, merged_dest) {
            Ok(Some(path)) => {
                counter!(m::DECODER_MERGED_TOTAL).increment(1);
                tracing::info!(
                    files = logs.len(),
                    merged = %path.display(),
                    "merged non-device logs"
                );
                return DecodeOutcome::usable(path);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to merge logs"),
        }
    }

    DecodeOutcome::failed("no usable log found in archive")
}

/// 컨테이너 파일을 복호화하여 로그 경로를 반환합니다. 실패 시 사유 문자열을 반환합니다.
fn decrypt_to_log(path: &Path, out_dir: &Path) -> Result<PathBuf, String> {
    let encrypted =
        std::fs::read(path).map_err(|e| format!("failed to read {}: {e}", display_name(path)))?;
    let decrypted = decrypt_container(&encrypted);
    if !decrypted.starts_with(ZIP_MAGIC) {
        return Err(INVALID_ARCHIVE_REASON.to_owned());
    }

    extract_zip_bytes(&decrypted, path, out_dir).map_err(|e| e.to_string())?;

    let canonical = out_dir.join(CANONICAL_LOG_NAME);
    if canonical.is_file() {
        return Ok(canonical);
    }
    find_files(out_dir, |p| {
        has_suffix(p, ".log") && std::fs::metadata(p).is_ok_and(|m| m.len() > 0)
    })
    .into_iter()
    .next()
    .ok_or_else(|| "decrypted archive contains no log file".to_owned())
}

async fn run_blocking<T, F>(f: F) -> Result<T, LogPipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LogPipelineError::Decode {
            path: String::new(),
            reason: format!("blocking task failed: {e}"),
        })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> ContainerDecoder {
        ContainerDecoder::new(PipelineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn signed_log_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("device.log");
        std::fs::write(&log, "2024-05-01 08:00:00 INFO: start\n").unwrap();

        let outcome = decoder().process(&log, dir.path()).await;
        assert_eq!(outcome, DecodeOutcome::usable(log));
    }

    #[tokio::test]
    async fn unsigned_log_is_flagged_suspect() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("web.log");
        std::fs::write(&log, "console output without markers\n").unwrap();

        let outcome = decoder().process(&log, dir.path()).await;
        assert_eq!(outcome.log_path.as_deref(), Some(log.as_path()));
        assert!(outcome.format_suspect);
    }

    #[tokio::test]
    async fn unknown_format_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

        let outcome = decoder().process(&file, dir.path()).await;
        assert!(!outcome.is_usable());
        assert!(outcome.reason.unwrap().contains("photo.jpg"));
    }

    #[tokio::test]
    async fn unknown_extension_with_signature_is_usable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("device.txt");
        std::fs::write(&file, "2024-05-01 08:00:00 INFO: start\n").unwrap();

        let outcome = decoder().process(&file, dir.path()).await;
        assert_eq!(outcome, DecodeOutcome::usable(file));
    }

    #[tokio::test]
    async fn container_that_is_not_an_archive_fails_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.plaud");
        std::fs::write(&file, vec![0x42u8; 300]).unwrap();

        let outcome = decoder().process(&file, dir.path()).await;
        assert_eq!(outcome.reason.as_deref(), Some(INVALID_ARCHIVE_REASON));
        assert!(outcome.log_path.is_none());
    }

    #[tokio::test]
    async fn decode_all_collects_logs_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.log");
        std::fs::write(&good, "2024-05-01 08:00:00 INFO: ok\n").unwrap();
        let bad = dir.path().join("bad.bin");
        std::fs::write(&bad, "????").unwrap();

        let corpus = decoder()
            .decode_all(&[good.clone(), bad], dir.path())
            .await;
        assert_eq!(corpus.logs, vec![good]);
        assert_eq!(corpus.diagnostics.len(), 1);
        assert!(corpus.diagnostics[0].starts_with("bad.bin:"));
    }
}
