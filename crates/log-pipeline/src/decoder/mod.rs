//! 컨테이너 디코더
//!
//! 임의의 입력 파일 하나를 받아 실제 형식을 판별하고, 필요하면 복호화/압축 해제를 거쳐
//! 디바이스 로그 하나를 찾아냅니다. 실패는 에러가 아니라 [`DecodeOutcome`]의 사유로 보고됩니다.
//!
//! - [`cipher`]: 고정 키 스트림 암호 (순수 함수)
//! - [`signature`]: 디바이스 로그 시그니처, ZIP 매직 판별
//! - [`archive`]: ZIP/gzip 해제, 재귀 탐색, 로그 병합
//! - [`container`]: 판별 순서와 폴백 체인을 구현한 [`ContainerDecoder`]

pub mod archive;
pub mod cipher;
pub mod container;
pub mod signature;

use std::path::PathBuf;

use serde::Serialize;

pub use container::ContainerDecoder;
pub use signature::SignatureDetector;

/// 입력 파일 하나의 디코딩 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeOutcome {
    /// 사용 가능한 로그 경로
    pub log_path: Option<PathBuf>,
    /// 형식이 의심스러운지 여부
    pub format_suspect: bool,
    /// 진단 사유
    pub reason: Option<String>,
}

impl DecodeOutcome {
    /// 시그니처 검사 또는 병합 폴백을 통과한 로그
    pub fn usable(path: PathBuf) -> Self {
        Self {
            log_path: Some(path),
            format_suspect: false,
            reason: None,
        }
    }

    /// 형식은 의심스럽지만 그대로 전달하는 로그
    pub fn suspect(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            log_path: Some(path),
            format_suspect: true,
            reason: Some(reason.into()),
        }
    }

    /// 사용 가능한 로그를 얻지 못함
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            log_path: None,
            format_suspect: true,
            reason: Some(reason.into()),
        }
    }

    /// 로그 경로가 있는지 여부
    pub fn is_usable(&self) -> bool {
        self.log_path.is_some()
    }
}

/// 입력 번들 하나에서 얻은 로그 모음
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogCorpus {
    /// 에이전트에 넘길 로그 파일
    pub logs: Vec<PathBuf>,
    /// 복구하지 못했거나 의심스러운 파일에 대한 진단
    pub diagnostics: Vec<String>,
}

impl LogCorpus {
    /// 사용 가능한 로그가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
