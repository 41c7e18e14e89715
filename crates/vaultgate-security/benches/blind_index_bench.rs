// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for blind-index hashing, salt lookup, and audit
// recording in the vaultgate-security crate.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use vaultgate_core::config::BlindIndexParams;
use vaultgate_core::principal::PrincipalKind;
use vaultgate_core::types::{SecretId, WorkspaceId};
use vaultgate_security::blind_index::hash_name;
use vaultgate_security::{AuditTrail, BlindIndexGenerator, BlindIndexStore, Decision, SqliteSaltStore};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Raw Argon2id cost at production parameters (64 MiB, single lane).
///
/// This is the number to size `max_concurrent_hashes` against.
fn bench_hash_production_params(c: &mut Criterion) {
    let params = BlindIndexParams::default();
    let salt = [0x42u8; 16];

    let mut group = c.benchmark_group("blind_index_argon2id");
    group.sample_size(10);
    group.bench_function("64 MiB / t=3 / p=1", |b| {
        b.iter(|| {
            let digest = hash_name(&params, black_box(b"DB_PASSWORD"), &salt).expect("hash failed");
            black_box(digest);
        });
    });
    group.finish();
}

/// Full `create_blind_index` path with cheap parameters, so the salt store
/// and blocking-pool hand-off dominate.
fn bench_create_blind_index(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let store = Arc::new(SqliteSaltStore::open_in_memory().expect("open salt store"));
    let generator =
        BlindIndexGenerator::new(store, BlindIndexParams::insecure_for_tests(), 4).expect("generator");
    let ws = WorkspaceId::new();

    c.bench_function("create_blind_index (1 MiB params)", |b| {
        b.iter(|| {
            let index = runtime
                .block_on(generator.create_blind_index(black_box("DB_PASSWORD"), ws))
                .expect("index failed");
            black_box(index);
        });
    });
}

/// Salt lookup against an in-memory SQLite store.
fn bench_salt_lookup(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let store = SqliteSaltStore::open_in_memory().expect("open salt store");
    let ws = WorkspaceId::new();
    runtime
        .block_on(store.get_or_create_salt(ws))
        .expect("seed salt");

    c.bench_function("find_salt (in-memory SQLite)", |b| {
        b.iter(|| {
            let record = runtime.block_on(store.find_salt(black_box(ws))).expect("lookup failed");
            black_box(record);
        });
    });
}

/// Recording a single-secret decision in the audit trail.
fn bench_audit_record(c: &mut Criterion) {
    c.bench_function("audit_record (in-memory SQLite)", |b| {
        let trail = AuditTrail::open_in_memory().expect("open in-memory audit trail");
        let ids = [SecretId::new()];

        b.iter(|| {
            trail
                .record(black_box(&Decision {
                    operation: "validate_secret",
                    principal_kind: PrincipalKind::ServiceToken,
                    principal_id: "st-bench",
                    secret_ids: &ids,
                    allowed: true,
                    details: None,
                }))
                .expect("record failed");
        });
    });
}

criterion_group!(
    benches,
    bench_hash_production_params,
    bench_create_blind_index,
    bench_salt_lookup,
    bench_audit_record,
);
criterion_main!(benches);
