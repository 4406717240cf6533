//! End-to-end installer tests: fixture archives served over HTTP, extracted
//! into a temporary module tree.

use gantry::{cancel, InstallError, InstallPlan, Installer, ModuleSpec, RegistryClient};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Build an in-memory `.nupkg` (zip) with a manifest and one payload file.
fn archive_bytes(name: &str, version: &str) -> Vec<u8> {
    let cursor = std::io::Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(cursor);
    let options = zip::write::SimpleFileOptions::default();

    zip.start_file(format!("{name}.psd1"), options).unwrap();
    zip.write_all(format!("@{{ ModuleVersion = '{version}' }}").as_bytes())
        .unwrap();
    zip.start_file(format!("{name}.psm1"), options).unwrap();
    zip.write_all(b"function Get-Nothing {}").unwrap();

    zip.finish().unwrap().into_inner()
}

async fn mount_archive(
    server: &mut mockito::ServerGuard,
    name: &str,
    version: &str,
) -> mockito::Mock {
    server
        .mock("GET", format!("/packages/{name}.{version}.nupkg").as_str())
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(archive_bytes(name, version))
        .create_async()
        .await
}

fn resolved(server_url: &str, name: &str, version: &str) -> ModuleSpec {
    ModuleSpec::exact(name, gantry::version::parse_either(version).unwrap())
        .with_download_uri(format!("{server_url}/packages/{name}.{version}.nupkg"))
}

fn installer_for(server: &mockito::ServerGuard, temp: &TempDir) -> Installer {
    let client = Arc::new(RegistryClient::new(server.url()).unwrap());
    Installer::new(
        client,
        temp.path().join("Modules"),
        temp.path().join("cache"),
    )
}

fn assert_installed(root: &Path, name: &str, version: &str) {
    let manifest = root
        .join("Modules")
        .join(name)
        .join(version)
        .join(format!("{name}.psd1"));
    assert!(manifest.is_file(), "missing manifest {}", manifest.display());
}

#[tokio::test]
async fn modules_land_in_the_destination_tree() {
    let mut server = mockito::Server::new_async().await;
    mount_archive(&mut server, "Pester", "5.5.0").await;

    let temp = TempDir::new().unwrap();
    let installer = installer_for(&server, &temp);

    let mut plan = InstallPlan::new();
    plan.add(resolved(&server.url(), "Pester", "5.5.0"));

    let (_handle, token) = cancel::token();
    installer.install(&plan, &token).await.unwrap();

    assert_installed(temp.path(), "Pester", "5.5.0");
    assert!(
        temp.path()
            .join("cache")
            .join("Pester.5.5.0.nupkg")
            .is_file()
    );
}

#[tokio::test]
async fn several_modules_install_in_one_run() {
    let mut server = mockito::Server::new_async().await;
    mount_archive(&mut server, "Pester", "5.5.0").await;
    mount_archive(&mut server, "PSScriptAnalyzer", "1.21.0").await;
    mount_archive(&mut server, "platyPS", "0.14.2").await;

    let temp = TempDir::new().unwrap();
    let installer = installer_for(&server, &temp);

    let mut plan = InstallPlan::new();
    for (name, version) in [
        ("Pester", "5.5.0"),
        ("PSScriptAnalyzer", "1.21.0"),
        ("platyPS", "0.14.2"),
    ] {
        plan.add(resolved(&server.url(), name, version));
    }

    let (_handle, token) = cancel::token();
    installer.install(&plan, &token).await.unwrap();

    assert_installed(temp.path(), "Pester", "5.5.0");
    assert_installed(temp.path(), "PSScriptAnalyzer", "1.21.0");
    assert_installed(temp.path(), "platyPS", "0.14.2");
}

#[tokio::test]
async fn missing_archive_fails_the_run() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/packages/Pester.5.5.0.nupkg")
        .with_status(404)
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let installer = installer_for(&server, &temp);

    let mut plan = InstallPlan::new();
    plan.add(resolved(&server.url(), "Pester", "5.5.0"));

    let (_handle, token) = cancel::token();
    let result = installer.install(&plan, &token).await;
    assert!(matches!(result, Err(InstallError::Open { .. })));
}

#[tokio::test]
async fn corrupt_archive_fails_extraction() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/packages/Pester.5.5.0.nupkg")
        .with_status(200)
        .with_body("this is not a zip archive")
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let installer = installer_for(&server, &temp);

    let mut plan = InstallPlan::new();
    plan.add(resolved(&server.url(), "Pester", "5.5.0"));

    let (_handle, token) = cancel::token();
    let result = installer.install(&plan, &token).await;
    assert!(matches!(result, Err(InstallError::Extract { .. })));
}

#[tokio::test]
async fn reinstall_overwrites_existing_files() {
    let mut server = mockito::Server::new_async().await;
    mount_archive(&mut server, "Pester", "5.5.0").await;

    let temp = TempDir::new().unwrap();
    let installer = installer_for(&server, &temp);

    let stale_dir = temp.path().join("Modules").join("Pester").join("5.5.0");
    std::fs::create_dir_all(&stale_dir).unwrap();
    std::fs::write(stale_dir.join("Pester.psd1"), b"stale contents").unwrap();

    let mut plan = InstallPlan::new();
    plan.add(resolved(&server.url(), "Pester", "5.5.0"));

    let (_handle, token) = cancel::token();
    installer.install(&plan, &token).await.unwrap();

    let contents = std::fs::read_to_string(stale_dir.join("Pester.psd1")).unwrap();
    assert!(contents.contains("ModuleVersion"));
}

#[tokio::test]
async fn member_without_download_uri_is_rejected() {
    let server = mockito::Server::new_async().await;
    let temp = TempDir::new().unwrap();
    let installer = installer_for(&server, &temp);

    let mut plan = InstallPlan::new();
    plan.add(ModuleSpec::exact(
        "Pester",
        gantry::version::parse_either("5.5.0").unwrap(),
    ));

    let (_handle, token) = cancel::token();
    let result = installer.install(&plan, &token).await;
    assert!(matches!(result, Err(InstallError::MissingDownloadUri { .. })));
}

/// Four-part versions extract into classical version directories, matching
/// what the local scanner expects to find.
#[tokio::test]
async fn four_part_versions_use_classical_directories() {
    let mut server = mockito::Server::new_async().await;
    mount_archive(&mut server, "Legacy", "1.2.3.4").await;

    let temp = TempDir::new().unwrap();
    let installer = installer_for(&server, &temp);

    let mut plan = InstallPlan::new();
    plan.add(resolved(&server.url(), "Legacy", "1.2.3.4"));

    let (_handle, token) = cancel::token();
    installer.install(&plan, &token).await.unwrap();

    assert_installed(temp.path(), "Legacy", "1.2.3.4");
}
