//! 외부 이슈 트래커 경계
//!
//! 파이프라인은 트래커를 세 가지 연산으로만 사용합니다:
//! 정규화된 이슈 조회, 원본 로그 바이트 다운로드, 포맷된 결과 게시.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::error::TrackerError;
use crate::types::{AnalysisResult, Issue, LogFileRef};

/// `Send` 가능한 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 이슈 트래커 trait
///
/// 구현체는 외부 서비스 클라이언트이거나 로컬 업로드 저장소일 수 있습니다.
pub trait IssueTracker: Send + Sync + 'static {
    /// 이슈 ID로 정규화된 이슈를 조회합니다.
    fn fetch_issue(
        &self,
        issue_id: &str,
    ) -> impl Future<Output = Result<Issue, TrackerError>> + Send;

    /// 로그 파일을 `dest_dir` 아래로 가져오고 저장된 경로를 반환합니다.
    fn fetch_log(
        &self,
        file: &LogFileRef,
        dest_dir: &Path,
    ) -> impl Future<Output = Result<PathBuf, TrackerError>> + Send;

    /// 포맷된 분석 결과를 게시합니다.
    fn post_result(
        &self,
        issue: &Issue,
        result: &AnalysisResult,
        formatted: &str,
    ) -> impl Future<Output = Result<(), TrackerError>> + Send;
}
