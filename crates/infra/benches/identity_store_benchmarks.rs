use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use churchos_auth::{
    Email, NewUser, PasswordHash, Permission, PermissionName, Role, SecretLookup, SecretPurpose, SecretSlot, User,
    hash_secret,
};
use churchos_core::UserId;
use churchos_infra::store::{AccessStore, InMemoryIdentityStore, PermissionStore, RoleStore, SecretStore, UserStore};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

/// Store with `users` users sharing one role that holds `permissions`
/// permissions.
fn populated(rt: &Runtime, users: usize, permissions: usize) -> (InMemoryIdentityStore, Vec<UserId>) {
    let store = InMemoryIdentityStore::new();
    let user_ids = rt.block_on(async {
        let mut ids = Vec::with_capacity(permissions);
        for i in 0..permissions {
            let name = PermissionName::parse(&format!("module{i}.action")).expect("name");
            let stored = store
                .upsert_permission(Permission::new(name, None, format!("module{i}")))
                .await
                .expect("permission");
            ids.push(stored.id);
        }
        let role = store
            .upsert_role(Role::new("Bench", None, ids).expect("role"))
            .await
            .expect("role");

        let mut user_ids = Vec::with_capacity(users);
        for i in 0..users {
            let user = User::create(
                NewUser {
                    name: format!("User {i}"),
                    email: Email::parse(&format!("user{i}@bench.test")).expect("email"),
                    phone_number: None,
                    password_hash: PasswordHash::from_phc("$argon2id$bench"),
                    role_id: role.id,
                    organization_id: None,
                },
                Utc::now(),
            )
            .expect("user");
            user_ids.push(store.insert_user(user).await.expect("insert").id);
        }
        user_ids
    });
    (store, user_ids)
}

fn bench_resolve_identity(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("resolve_identity");
    for permissions in [8usize, 64, 256] {
        let (store, users) = populated(&rt, 100, permissions);
        group.bench_with_input(BenchmarkId::from_parameter(permissions), &permissions, |b, _| {
            b.iter(|| {
                let identity = rt.block_on(store.resolve_identity(users[0])).expect("resolve");
                black_box(identity)
            })
        });
    }
    group.finish();
}

fn bench_hash_only_consume(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("consume_by_hash");
    for users in [100usize, 1_000, 10_000] {
        let (store, ids) = populated(&rt, users, 8);
        let target = ids[users / 2];
        group.throughput(Throughput::Elements(users as u64));
        group.bench_with_input(BenchmarkId::from_parameter(users), &users, |b, _| {
            b.iter(|| {
                let now = Utc::now();
                let slot = SecretSlot::issue(SecretPurpose::EmailVerification, "bench-token", now);
                rt.block_on(async {
                    SecretStore::<User>::put_secret(&store, target, SecretPurpose::EmailVerification, slot)
                        .await
                        .expect("put");
                    let consumed = SecretStore::<User>::consume_secret(
                        &store,
                        &SecretLookup::HashOnly,
                        SecretPurpose::EmailVerification,
                        &hash_secret("bench-token"),
                        now,
                    )
                    .await
                    .expect("consume");
                    black_box(consumed)
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve_identity, bench_hash_only_consume);
criterion_main!(benches);
