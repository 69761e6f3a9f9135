//! 통합 테스트 -- 번들 디코딩부터 사전 추출까지의 흐름 검증
//!
//! 네 가지 입력 형식(암호화 컨테이너, ZIP, 로그 파일, ZIP 안의 gzip)과
//! 규칙 분류/확장, 추출 결과를 공개 API만으로 검증합니다.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logtriage_log_pipeline::decoder::cipher::encrypt_container;
use logtriage_log_pipeline::{
    ContainerDecoder, Extractor, MemoryRuleStore, PipelineConfig, RuleCatalog,
};

const SIGNED_LINE: &str = "2024-03-01 10:22:01.123 INFO: ble connected\n";

fn decoder() -> ContainerDecoder {
    ContainerDecoder::new(PipelineConfig::default()).unwrap()
}

fn zip_bytes(entries: &[(&str, &[u8])], method: zip::CompressionMethod) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default().compression_method(method);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn signed_log(len: usize) -> Vec<u8> {
    let mut data = SIGNED_LINE.as_bytes().to_vec();
    let mut i = 0;
    while data.len() < len {
        data.extend_from_slice(format!("2024-03-01 10:22:02 INFO: heartbeat {i}\n").as_bytes());
        i += 1;
    }
    data
}

/// 8192바이트를 넘는 암호화 컨테이너 -> plaud.log
#[tokio::test]
async fn two_chunk_container_yields_canonical_log() {
    let dir = tempfile::tempdir().unwrap();
    let archive = zip_bytes(
        &[("device/plaud.log", &signed_log(10_000))],
        zip::CompressionMethod::Stored,
    );
    assert!(archive.len() > 8192);
    let input = write(dir.path(), "bundle.plaud", &encrypt_container(&archive));

    let outcome = decoder().process(&input, &dir.path().join("processed")).await;

    let log = outcome.log_path.clone().unwrap();
    assert!(!outcome.format_suspect);
    assert_eq!(log.file_name().unwrap(), "plaud.log");
    let content = std::fs::read(&log).unwrap();
    assert_eq!(content, signed_log(10_000));
}

/// 시그니처 없는 로그 두 개 -> 배너가 붙은 병합 파일
#[tokio::test]
async fn unsigned_logs_in_zip_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    let archive = zip_bytes(
        &[
            ("app/small.log", b"tiny app log\n".as_slice()),
            ("sys/large.log", b"a much larger system log body\nwith two lines\n".as_slice()),
            ("sys/empty.log", b"".as_slice()),
        ],
        zip::CompressionMethod::Deflated,
    );
    let input = write(dir.path(), "bundle.zip", &archive);

    let outcome = decoder().process(&input, &dir.path().join("processed")).await;

    assert!(!outcome.format_suspect);
    let merged = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
    let large_at = merged.find("=== FILE: sys/large.log").unwrap();
    let small_at = merged.find("=== FILE: app/small.log").unwrap();
    assert!(large_at < small_at, "largest file comes first");
    assert!(merged.contains("tiny app log"));
    assert!(merged.contains(&"=".repeat(60)));
    assert!(!merged.contains("empty.log"));
}

/// ZIP 안의 .log.gz -> 압축 해제 후 시그니처 통과
#[tokio::test]
async fn gzip_inside_zip_is_decompressed() {
    let dir = tempfile::tempdir().unwrap();
    let archive = zip_bytes(
        &[
            ("notes.txt", b"readme".as_slice()),
            ("logs/device.log.gz", gzip_bytes(SIGNED_LINE.as_bytes()).as_slice()),
        ],
        zip::CompressionMethod::Deflated,
    );
    let input = write(dir.path(), "bundle.zip", &archive);

    let outcome = decoder().process(&input, &dir.path().join("processed")).await;

    let log = outcome.log_path.unwrap();
    assert!(!outcome.format_suspect);
    assert_eq!(log.file_name().unwrap(), "device.log");
    assert_eq!(std::fs::read_to_string(log).unwrap(), SIGNED_LINE);
}

/// 이름만 바꾼 ZIP -> 복호화가 아니라 아카이브 경로로 처리
#[tokio::test]
async fn renamed_zip_container_skips_decryption() {
    let dir = tempfile::tempdir().unwrap();
    let archive = zip_bytes(
        &[("plaud.log", SIGNED_LINE.as_bytes())],
        zip::CompressionMethod::Deflated,
    );
    let input = write(dir.path(), "renamed.plaud", &archive);

    let outcome = decoder().process(&input, &dir.path().join("processed")).await;

    assert!(outcome.is_usable());
    assert!(!outcome.format_suspect);
}

/// ZIP 안에 중첩된 암호화 컨테이너
#[tokio::test]
async fn nested_container_in_zip_is_decrypted() {
    let dir = tempfile::tempdir().unwrap();
    let inner = zip_bytes(
        &[("plaud.log", SIGNED_LINE.as_bytes())],
        zip::CompressionMethod::Deflated,
    );
    let outer = zip_bytes(
        &[("export/device.plaud", encrypt_container(&inner).as_slice())],
        zip::CompressionMethod::Stored,
    );
    let input = write(dir.path(), "outer.zip", &outer);

    let outcome = decoder().process(&input, &dir.path().join("processed")).await;

    let log = outcome.log_path.unwrap();
    assert_eq!(std::fs::read_to_string(log).unwrap(), SIGNED_LINE);
}

/// 사용 가능한 로그가 없는 번들도 진단만 남기고 계속 진행
#[tokio::test]
async fn undecodable_bundle_only_adds_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let broken = write(dir.path(), "broken.plaud", b"definitely not encrypted zip");
    let good = write(dir.path(), "device.log", SIGNED_LINE.as_bytes());

    let corpus = decoder()
        .decode_all(&[broken, good.clone()], &dir.path().join("processed"))
        .await;

    assert_eq!(corpus.logs, vec![good]);
    assert_eq!(corpus.diagnostics.len(), 1);
    assert!(corpus.diagnostics[0].starts_with("broken.plaud: "));
}

/// 규칙 분류와 한 단계 의존성 확장
#[tokio::test]
async fn classify_and_expand_seeded_rules() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.md",
        b"---\nid: A\ntriggers:\n  keywords: [bluetooth]\n  priority: 8\ndepends_on: [common]\n---\nA body\n",
    );
    write(
        dir.path(),
        "b.md",
        b"---\nid: B\ntriggers:\n  keywords: [wifi]\n  priority: 5\n---\nB body\n",
    );
    write(
        dir.path(),
        "common.md",
        b"---\nid: common\ndepends_on: [B]\n---\nshared steps\n",
    );

    let catalog = RuleCatalog::new(MemoryRuleStore::new(), "general");
    catalog.seed_from_dir(dir.path()).await.unwrap();

    let description = "bluetooth disconnect issue";
    assert_eq!(catalog.classify(description).await, "A");
    assert_eq!(catalog.classify(description).await, "A");

    let ids: Vec<_> = catalog
        .match_rules(description)
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["A", "common"]);
}

/// 디코딩 -> 규칙 매칭 -> 사전 추출
#[tokio::test]
async fn decoded_corpus_feeds_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = SIGNED_LINE.to_owned();
    log.push_str("2024-03-02 08:00:00 INFO: BLE disconnect reason=0x13\n");
    log.push_str("2024-03-02 08:00:05 ERROR: reconnect failed\n");
    let archive = zip_bytes(&[("plaud.log", log.as_bytes())], zip::CompressionMethod::Deflated);
    let input = write(dir.path(), "bundle.plaud", &encrypt_container(&archive));

    let rules_dir = dir.path().join("rules");
    std::fs::create_dir(&rules_dir).unwrap();
    write(
        &rules_dir,
        "ble.md",
        b"---\nid: ble\ntriggers:\n  keywords: [bluetooth]\npre_extract:\n  - name: disconnect\n    pattern: \"BLE disconnect reason=0x[0-9a-f]+\"\n    date_filter: true\n---\nbody\n",
    );

    let corpus = decoder()
        .decode_all(&[input], &dir.path().join("processed"))
        .await;
    assert_eq!(corpus.logs.len(), 1);

    let catalog = RuleCatalog::new(MemoryRuleStore::new(), "general");
    catalog.seed_from_dir(&rules_dir).await.unwrap();
    let rules = catalog.match_rules("Bluetooth drops on 2024-03-02").await;

    let extractor = Extractor::new(20, Duration::from_secs(10)).unwrap();
    let result = extractor
        .extract(&rules, &corpus.logs, Some("2024-03-02"))
        .await;

    let extract = &result.patterns["ble.disconnect"];
    assert_eq!(extract.match_count, 1);
    assert!(extract.matches[0].ends_with("reason=0x13"));
    assert_eq!(result.error_summary["plaud.log"].errors, 1);
    assert_eq!(result.error_summary["plaud.log"].failures, 1);
}
