//! Behaviour-driven tests for platform resolution and the artifact locator.
//!
//! These scenarios exercise the release table lookup that runs before any
//! network access. Tests use the rstest-bdd v0.5.0 mutable world pattern.

use ga_installer::platform::{Platform, PlatformError, resolve_from};
use ga_installer::release::table::{LocateError, ReleaseArtifact, ReleaseTable};
use ga_installer::test_utils::{artifact_url, release_table_toml, sha256_hex};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LocatorWorld {
    table: Option<ReleaseTable>,
    platform_error: Option<PlatformError>,
    located: Option<Result<ReleaseArtifact, LocateError>>,
}

#[fixture]
fn world() -> LocatorWorld {
    LocatorWorld::default()
}

fn platform(os: &str, arch: &str) -> Platform {
    Platform::new(
        os.parse().expect("test OS"),
        arch.parse().expect("test arch"),
    )
}

fn table_with(rows: &[(Platform, &str)]) -> ReleaseTable {
    let urls: Vec<String> = rows.iter().map(|(p, _)| artifact_url(*p)).collect();
    let rows: Vec<(Platform, &str, &str)> = rows
        .iter()
        .zip(&urls)
        .map(|((p, digest), url)| (*p, url.as_str(), *digest))
        .collect();
    ReleaseTable::from_toml_str(&release_table_toml("0.1.0", &rows)).expect("valid table")
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a release table covering all four platforms")]
fn given_full_table(world: &mut LocatorWorld) {
    let digest = sha256_hex(b"archive");
    let rows: Vec<(Platform, &str)> = Platform::all()
        .into_iter()
        .map(|p| (p, digest.as_str()))
        .collect();
    world.table = Some(table_with(&rows));
}

#[given("a release table with only \"{os}\" \"{arch}\"")]
fn given_single_row(world: &mut LocatorWorld, os: String, arch: String) {
    let digest = sha256_hex(b"archive");
    world.table = Some(table_with(&[(platform(&os, &arch), digest.as_str())]));
}

#[given("a release table with a pending digest for \"{os}\" \"{arch}\"")]
fn given_pending_row(world: &mut LocatorWorld, os: String, arch: String) {
    world.table = Some(table_with(&[(platform(&os, &arch), "PENDING_SHA256")]));
}

#[given("the bundled release table")]
fn given_bundled_table(world: &mut LocatorWorld) {
    world.table = Some(ReleaseTable::bundled().expect("bundled table parses"));
}

#[when("the host \"{os}\" \"{arch}\" is resolved and located")]
fn when_resolved_and_located(world: &mut LocatorWorld, os: String, arch: String) {
    match resolve_from(&os, &arch) {
        Ok(platform) => {
            let table = world.table.as_ref().expect("table set");
            world.located = Some(table.locate_requested(platform, None));
        }
        Err(err) => world.platform_error = Some(err),
    }
}

#[then("the artifact URL ends with \"{suffix}\"")]
fn then_url_ends_with(world: &mut LocatorWorld, suffix: String) {
    let artifact = world
        .located
        .as_ref()
        .expect("lookup ran")
        .as_ref()
        .expect("artifact found");
    assert!(
        artifact.url.ends_with(&suffix),
        "unexpected URL {}",
        artifact.url
    );
}

#[then("the lookup reports no artifact")]
fn then_not_found(world: &mut LocatorWorld) {
    assert!(matches!(
        world.located,
        Some(Err(LocateError::NotFound { .. }))
    ));
}

#[then("the lookup reports a pending digest")]
fn then_pending(world: &mut LocatorWorld) {
    assert!(matches!(
        world.located,
        Some(Err(LocateError::DigestPending { .. }))
    ));
}

#[then("the platform is reported as unsupported")]
fn then_unsupported(world: &mut LocatorWorld) {
    assert!(matches!(
        world.platform_error,
        Some(PlatformError::Unsupported { .. })
    ));
    assert!(world.located.is_none());
}

#[then("every supported platform has a row")]
fn then_every_platform_listed(world: &mut LocatorWorld) {
    let table = world.table.as_ref().expect("table set");
    for platform in Platform::all() {
        assert!(
            table.entries().any(|entry| entry.platform == platform),
            "no row for {platform}"
        );
    }
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/artifact_locator.feature",
    name = "Each supported host resolves to its own artifact"
)]
fn scenario_exact_match(world: LocatorWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/artifact_locator.feature",
    name = "Darwin is normalised to macOS"
)]
fn scenario_darwin_alias(world: LocatorWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/artifact_locator.feature",
    name = "No fallback across architectures"
)]
fn scenario_no_fallback(world: LocatorWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/artifact_locator.feature",
    name = "Pending digests are not installable"
)]
fn scenario_pending_digest(world: LocatorWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/artifact_locator.feature",
    name = "Unsupported hosts are rejected"
)]
fn scenario_unsupported_host(world: LocatorWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/artifact_locator.feature",
    name = "The bundled table lists every platform"
)]
fn scenario_bundled_table(world: LocatorWorld) {
    let _ = world;
}
