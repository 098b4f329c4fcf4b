//! # GDX — Versioned Transactional Geodatabase Core
//!
//! GDX는 버전 트리 위에서 동작하는 트랜잭션 지오데이터베이스 엔진입니다.
//! 순수 Rust로 구현되었으며, 테이블·피처 클래스·도메인·관계 클래스를
//! 버전별로 편집하고 reconcile/post로 병합합니다.
//!
//! ## 주요 특징
//!
//! - **Version Graph**: `DEFAULT` 루트 아래 자식 버전, Shadow Chain 기반 행 해석
//! - **Edit Session**: Typestate 패턴 기반 버전별 단일 writer 세션
//! - **Reconcile/Post**: 명시적 상태 기계, by-row/by-column 충돌 감지
//! - **Query Filter**: SQL where 절, 공간 필터, 정렬, 하위 필드, Arrow 내보내기
//! - **Schema Builder**: 토큰 기반 DDL 배치, 전체 롤백
//!
//! ## 빠른 시작
//!
//! ```rust
//! use gdx_core::{Geodatabase, VersionId};
//! use gdx_core::api::QueryFilter;
//! use gdx_core::reconcile::ReconcileOptions;
//! use gdx_core::schema::{FieldDescription, TableDescription, Value};
//! use gdx_core::transaction::VersionAccess;
//!
//! # fn main() -> gdx_core::GdxResult<()> {
//! let db = Geodatabase::open_in_memory()?;
//! db.create_table(TableDescription::new("Trees").field(FieldDescription::text("NAME", 32)))?;
//!
//! // 자식 버전에서 편집
//! let child = db.create_version(VersionId::DEFAULT, "survey", VersionAccess::Public)?;
//! let mut session = db.begin_edit(child)?;
//! let id = session.create("Trees", [("NAME", "Pine")])?;
//! session.commit()?;
//!
//! // 부모에 반영
//! let result = db.reconcile(child, ReconcileOptions::new().post(true))?;
//! assert!(result.success);
//!
//! let pines = db.count(VersionId::DEFAULT, "Trees", &QueryFilter::new().where_clause("NAME = 'Pine'"))?;
//! assert_eq!(pines, 1);
//! assert_eq!(db.get_row(VersionId::DEFAULT, "Trees", id)?.get("NAME"), Some(&Value::from("Pine")));
//! # Ok(())
//! # }
//! ```
//!
//! ## 아키텍처
//!
//! ```text
//! Geodatabase ─┬─ Catalog (schema, swapped whole by SchemaBuilder)
//!              ├─ VersionGraph (tree, base histories, ancestor LRU)
//!              ├─ DeltaStore (SkipMap per table, (row, version, generation) keys)
//!              └─ Journal (sled, replayed on open)
//! ```
//!
//! ## 모듈 구조
//!
//! - [`engine`] — 지오데이터베이스 엔진 ([`Geodatabase`]), 커서, DDL 적용
//! - [`api`] — 버전 핸들, 편집 세션, 쿼리 필터, 행 변환 트레이트
//! - [`reconcile`] — reconcile/post 상태 기계
//! - [`schema`] — 카탈로그, 필드 타입, 스키마 빌더
//! - [`sql`] — where 절 파서와 술어 평가
//! - [`geometry`] — 점·선·면 지오메트리와 공간 관계
//! - [`storage`] — Delta Store, journal, Arrow 내보내기
//! - [`transaction`] — generation, 스냅샷, 버전 그래프, writer lease

pub mod api;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod reconcile;
pub mod schema;
pub mod sql;
pub mod storage;
pub mod transaction;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use engine::{DurabilityLevel, Geodatabase, GeodatabaseConfig};
pub use error::{ErrorKind, GdxError, GdxResult};
pub use transaction::{Generation, VersionId};

// Re-export derive macros
pub use gdx_derive::Table;
