//! 아카이브 처리 헬퍼
//!
//! ZIP 추출(라이브러리 + 외부 unzip 폴백), gzip 해제, 재귀 파일 탐색,
//! 로그 병합을 담당합니다. 외부 프로세스를 제외한 함수는 모두 blocking I/O이므로
//! 호출자는 `spawn_blocking` 안에서 사용합니다.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::LogPipelineError;

/// 병합 배너 구분선 길이
const BANNER_WIDTH: usize = 60;

/// 단일 엔트리 최대 해제 크기
const MAX_ENTRY_SIZE: u64 = 2 * 1024 * 1024 * 1024; // 2GB

fn decode_err(path: &Path, reason: impl Into<String>) -> LogPipelineError {
    LogPipelineError::Decode {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// ZIP 파일을 `dest` 아래로 추출하고 추출된 파일 수를 반환합니다.
pub fn extract_zip_file(path: &Path, dest: &Path) -> Result<usize, LogPipelineError> {
    let file = File::open(path)?;
    let archive =
        ZipArchive::new(file).map_err(|e| decode_err(path, format!("failed to read zip: {e}")))?;
    extract_archive(archive, path, dest)
}

/// 메모리 상의 ZIP 바이트를 `dest` 아래로 추출합니다.
pub fn extract_zip_bytes(
    data: &[u8],
    source: &Path,
    dest: &Path,
) -> Result<usize, LogPipelineError> {
    let archive = ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| decode_err(source, format!("failed to read zip: {e}")))?;
    extract_archive(archive, source, dest)
}

fn extract_archive<R: Read + Seek>(
    mut archive: ZipArchive<R>,
    source: &Path,
    dest: &Path,
) -> Result<usize, LogPipelineError> {
    std::fs::create_dir_all(dest)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| decode_err(source, format!("failed to read zip entry: {e}")))?;

        // path traversal 방지: 아카이브 루트를 벗어나는 엔트리는 건너뜀
        let Some(rel_path) = entry.enclosed_name() else {
            tracing::warn!(
                archive = %source.display(),
                entry = entry.name(),
                "skipping zip entry with unsafe path"
            );
            continue;
        };
        let out_path = dest.join(rel_path);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if entry.size() > MAX_ENTRY_SIZE {
            return Err(decode_err(
                source,
                format!("zip entry too large: {} bytes", entry.size()),
            ));
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| decode_err(source, format!("failed to inflate {}: {e}", entry.name())))?;
        extracted += 1;
    }

    Ok(extracted)
}

/// 외부 unzip 유틸리티로 추출합니다.
///
/// 라이브러리가 지원하지 않는 압축 방식(Deflate64 등)을 처리하기 위한 폴백입니다.
/// 종료 코드 1은 경고만 있는 성공으로 간주합니다.
pub async fn extract_zip_external(
    program: &str,
    path: &Path,
    dest: &Path,
    timeout: Duration,
) -> Result<(), LogPipelineError> {
    tokio::fs::create_dir_all(dest).await?;

    let child = tokio::process::Command::new(program)
        .arg("-o")
        .arg("-q")
        .arg(path)
        .arg("-d")
        .arg(dest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| decode_err(path, format!("failed to spawn {program}: {e}")))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            decode_err(
                path,
                format!("{program} timed out after {}s", timeout.as_secs()),
            )
        })??;

    match output.status.code() {
        Some(0) | Some(1) => Ok(()),
        code => Err(decode_err(
            path,
            format!(
                "{program} exited with {:?}: {}",
                code,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        )),
    }
}

/// `.gz` 파일을 같은 위치에 해제하고 해제된 경로를 반환합니다.
///
/// `app.log.gz` → `app.log`
pub fn gunzip_file(path: &Path) -> Result<PathBuf, LogPipelineError> {
    let out_path = path.with_extension("");
    let mut decoder = GzDecoder::new(File::open(path)?);
    let mut out = File::create(&out_path)?;
    std::io::copy(&mut decoder, &mut out)
        .map_err(|e| decode_err(path, format!("failed to decompress gzip: {e}")))?;
    Ok(out_path)
}

/// `root` 아래의 파일을 재귀적으로 찾아 경로 순으로 반환합니다.
pub fn find_files(root: &Path, predicate: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable dir");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => stack.push(path),
                Ok(ft) if ft.is_file() && predicate(&path) => found.push(path),
                _ => {}
            }
        }
    }

    found.sort();
    found
}

/// 파일 이름이 주어진 접미사로 끝나는지 대소문자 무시 비교합니다.
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().ends_with(suffix))
}

/// 여러 로그 파일을 크기 내림차순으로 하나의 파일에 병합합니다.
///
/// 각 섹션 앞에는 원본 파일 이름과 크기를 담은 배너가 붙고,
/// 0바이트 파일은 건너뜁니다. 결과 파일이 비어 있으면 `None`을 반환합니다.
pub fn merge_logs(
    logs: &[PathBuf],
    root: &Path,
    dest: &Path,
) -> Result<Option<PathBuf>, LogPipelineError> {
    let mut sized: Vec<(u64, &PathBuf)> = logs
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok().map(|m| (m.len(), p)))
        .collect();
    // 크기 내림차순, 같은 크기는 경로 순
    sized.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::io::BufWriter::new(File::create(dest)?);
    let rule = "=".repeat(BANNER_WIDTH);
    let mut merged = 0usize;

    for (size, path) in sized {
        if size == 0 {
            continue;
        }
        let name = path.strip_prefix(root).unwrap_or(path).display().to_string();
        let content = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read log for merge");
                continue;
            }
        };
        write!(out, "\n{rule}\n=== FILE: {name} (size: {size}) ===\n{rule}\n\n")?;
        out.write_all(String::from_utf8_lossy(&content).as_bytes())?;
        out.write_all(b"\n")?;
        merged += 1;
    }
    out.flush()?;
    drop(out);

    if merged == 0 {
        let _ = std::fs::remove_file(dest);
        return Ok(None);
    }
    Ok(Some(dest.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bundle.zip");
        write_zip(
            &zip_path,
            &[("logs/app.log", b"hello"), ("readme.txt", b"x")],
        );

        let dest = dir.path().join("out");
        let count = extract_zip_file(&zip_path, &dest).unwrap();
        assert_eq!(count, 2);
        assert_eq!(std::fs::read(dest.join("logs/app.log")).unwrap(), b"hello");
    }

    #[test]
    fn rejects_non_zip_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_zip_bytes(b"not a zip", Path::new("x.plaud"), dir.path()).unwrap_err();
        assert!(matches!(err, LogPipelineError::Decode { .. }));
    }

    #[test]
    fn gunzip_strips_gz_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let gz_path = dir.path().join("device.log.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"2024-01-01 00:00:00 INFO: x").unwrap();
        std::fs::write(&gz_path, enc.finish().unwrap()).unwrap();

        let out = gunzip_file(&gz_path).unwrap();
        assert_eq!(out, dir.path().join("device.log"));
        assert_eq!(std::fs::read(&out).unwrap(), b"2024-01-01 00:00:00 INFO: x");
    }

    #[test]
    fn merge_orders_by_size_and_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.log");
        let big = dir.path().join("big.log");
        let empty = dir.path().join("empty.log");
        std::fs::write(&small, "s").unwrap();
        std::fs::write(&big, "bbbbbbbbbb").unwrap();
        std::fs::write(&empty, "").unwrap();

        let dest = dir.path().join("merged.log");
        let merged = merge_logs(&[small, big, empty], dir.path(), &dest)
            .unwrap()
            .unwrap();
        let text = std::fs::read_to_string(merged).unwrap();

        let big_at = text.find("=== FILE: big.log (size: 10) ===").unwrap();
        let small_at = text.find("=== FILE: small.log (size: 1) ===").unwrap();
        assert!(big_at < small_at);
        assert!(!text.contains("empty.log"));
        assert!(text.contains(&"=".repeat(60)));
    }

    #[test]
    fn merge_of_only_empty_files_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.log");
        std::fs::write(&empty, "").unwrap();
        let dest = dir.path().join("merged.log");
        assert!(merge_logs(&[empty], dir.path(), &dest).unwrap().is_none());
        assert!(!dest.exists());
    }

    #[test]
    fn find_files_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/z.log"), "1").unwrap();
        std::fs::write(dir.path().join("a/y.LOG"), "1").unwrap();
        std::fs::write(dir.path().join("x.txt"), "1").unwrap();

        let found = find_files(dir.path(), |p| has_suffix(p, ".log"));
        assert_eq!(found.len(), 2);
        assert!(found.windows(2).all(|w| w[0] <= w[1]));
    }
}
