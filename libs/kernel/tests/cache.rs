//! Integration tests for the kernel cache.
//!
//! A wiremock server stands in for the release host so hits, misses and
//! download failures can be observed without network access.

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xz2::write::XzEncoder;

use cluster_kernel::{KernelArchive, KernelCache, KernelError, KERNEL_MODE};

const ENTRY: &str = "opt/kata/share/kata-containers/vmlinux";
const KERNEL: &[u8] = b"\x7fELF-not-really-a-kernel";

enum Item<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
    Symlink(&'a str, &'a str),
}

fn tar(items: &[Item<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for item in items {
        let mut header = tar::Header::new_gnu();
        match item {
            Item::File(name, data) => {
                header.set_size(data.len() as u64);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, name, *data).unwrap();
            }
            Item::Dir(name) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, name, std::io::empty()).unwrap();
            }
            Item::Symlink(name, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, name, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

fn tar_gz(items: &[Item<'_>]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&tar(items)).unwrap();
    encoder.finish().unwrap()
}

fn tar_xz(items: &[Item<'_>]) -> Vec<u8> {
    let mut encoder = XzEncoder::new(Vec::new(), 1);
    encoder.write_all(&tar(items)).unwrap();
    encoder.finish().unwrap()
}

const KERNEL_BUNDLE: &[Item<'static>] = &[
    Item::Dir("opt/kata/share/kata-containers/"),
    Item::File("opt/kata/share/kata-containers/config.toml", b"[hypervisor]"),
    Item::File(ENTRY, KERNEL),
];

fn kernel_archive() -> Vec<u8> {
    tar_gz(KERNEL_BUNDLE)
}

fn cache_for(server: &MockServer, root: &Path, url_path: &str) -> KernelCache {
    let archive = KernelArchive {
        url: format!("{}{}", server.uri(), url_path),
        entry: ENTRY.to_string(),
        sha256: None,
    };
    KernelCache::new(root, archive).unwrap()
}

/// Names of entries in the cache root that look like leftover work dirs.
fn leftovers(root: &Path) -> Vec<String> {
    fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(".fetch-"))
        .collect()
}

#[tokio::test]
async fn test_cache_miss_downloads_and_extracts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kata-static.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(kernel_archive()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("kernels");
    let cache = cache_for(&server, &root, "/kata-static.tar.gz");

    let resolved = cache.resolve(None).await.unwrap();

    assert_eq!(resolved, root.join("kata-static.tar.gz").join("vmlinux"));
    assert_eq!(fs::read(&resolved).unwrap(), KERNEL);
    assert!(leftovers(&root).is_empty());

    let files: Vec<_> = fs::read_dir(root.join("kata-static.tar.gz"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("vmlinux")]);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&resolved).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, KERNEL_MODE);
    }
}

#[tokio::test]
async fn test_cache_miss_extracts_xz_bundle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kata-static-amd64.tar.xz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tar_xz(KERNEL_BUNDLE)))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static-amd64.tar.xz");

    let resolved = cache.resolve(None).await.unwrap();

    assert_eq!(resolved, temp.path().join("kata-static-amd64.tar.xz/vmlinux"));
    assert_eq!(fs::read(&resolved).unwrap(), KERNEL);
    assert!(leftovers(temp.path()).is_empty());
}

#[tokio::test]
async fn test_unrecognised_archive_fails_and_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(b"<html>rate limited</html>".to_vec()),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static.tar.xz");

    let err = cache.resolve(None).await.unwrap_err();

    assert!(matches!(err, KernelError::UnsupportedArchive { .. }), "got {err:?}");
    assert!(!cache.cached_path().exists());
    assert!(leftovers(temp.path()).is_empty());
}

#[tokio::test]
async fn test_concurrent_misses_both_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kata-static.tar.xz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tar_xz(KERNEL_BUNDLE)))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let first = cache_for(&server, temp.path(), "/kata-static.tar.xz");
    let second = cache_for(&server, temp.path(), "/kata-static.tar.xz");

    for _ in 0..8 {
        let _ = fs::remove_file(first.cached_path());

        let (a, b) = tokio::join!(first.resolve(None), second.resolve(None));
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(a, b);
        assert_eq!(fs::read(&a).unwrap(), KERNEL);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&a).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, KERNEL_MODE);
        }
    }

    let files: Vec<_> = fs::read_dir(temp.path().join("kata-static.tar.xz"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("vmlinux")]);
    assert!(leftovers(temp.path()).is_empty());
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(kernel_archive()))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static.tar.gz");
    fs::create_dir_all(cache.cached_path().parent().unwrap()).unwrap();
    fs::write(cache.cached_path(), b"previously cached").unwrap();

    let resolved = cache.resolve(None).await.unwrap();

    assert_eq!(resolved, cache.cached_path());
    assert_eq!(fs::read(&resolved).unwrap(), b"previously cached");
}

#[tokio::test]
async fn test_empty_cached_file_is_replaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kata-static.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(kernel_archive()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static.tar.gz");
    fs::create_dir_all(cache.cached_path().parent().unwrap()).unwrap();
    fs::write(cache.cached_path(), b"").unwrap();

    let resolved = cache.resolve(None).await.unwrap();
    assert_eq!(fs::read(resolved).unwrap(), KERNEL);
}

#[tokio::test]
async fn test_explicit_kernel_is_returned_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, &temp.path().join("kernels"), "/kata-static.tar.gz");
    let explicit = temp.path().join("does-not-exist/vmlinux");

    let resolved = cache.resolve(Some(&explicit)).await.unwrap();

    assert_eq!(resolved, explicit);
    assert!(!temp.path().join("kernels").exists());
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest.tar.gz"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/v2/kata.tar.gz", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/kata.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(kernel_archive()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/latest.tar.gz");

    let resolved = cache.resolve(None).await.unwrap();

    assert_eq!(resolved, temp.path().join("latest.tar.gz/vmlinux"));
    assert_eq!(fs::read(resolved).unwrap(), KERNEL);
}

#[tokio::test]
async fn test_http_error_status_fails_and_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static.tar.gz");

    let err = cache.resolve(None).await.unwrap_err();

    assert!(matches!(err, KernelError::Download { status: 404, .. }));
    assert!(err.to_string().contains("404"));
    assert!(!cache.cached_path().exists());
    assert!(leftovers(temp.path()).is_empty());
}

#[tokio::test]
async fn test_missing_entry_fails_and_cleans_up() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[Item::File("opt/kata/other", b"nope")]);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static.tar.gz");

    let err = cache.resolve(None).await.unwrap_err();

    assert!(matches!(err, KernelError::EntryMissing { .. }));
    assert!(!cache.cached_path().exists());
    assert!(leftovers(temp.path()).is_empty());
}

#[tokio::test]
async fn test_symlink_entry_is_rejected() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[
        Item::File("opt/kata/share/kata-containers/vmlinux-6.12", KERNEL),
        Item::Symlink(ENTRY, "vmlinux-6.12"),
    ]);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static.tar.gz");

    let err = cache.resolve(None).await.unwrap_err();

    match err {
        KernelError::EntryNotFile { kind, .. } => assert_eq!(kind, "symlink"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(leftovers(temp.path()).is_empty());
}

#[tokio::test]
async fn test_directory_entry_is_rejected() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[Item::Dir("opt/kata/share/kata-containers/vmlinux/")]);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let cache = cache_for(&server, temp.path(), "/kata-static.tar.gz");

    let err = cache.resolve(None).await.unwrap_err();
    assert!(matches!(err, KernelError::EntryNotFile { .. }));
}

#[tokio::test]
async fn test_digest_is_checked_when_configured() {
    let body = kernel_archive();
    let good = hex::encode(Sha256::digest(&body));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();

    let bad = KernelCache::new(
        temp.path().join("bad"),
        KernelArchive {
            url: format!("{}/kata-static.tar.gz", server.uri()),
            entry: ENTRY.to_string(),
            sha256: Some("00".repeat(32)),
        },
    )
    .unwrap();
    let err = bad.resolve(None).await.unwrap_err();
    assert!(matches!(err, KernelError::DigestMismatch { .. }));
    assert!(!bad.cached_path().exists());

    let ok = KernelCache::new(
        temp.path().join("ok"),
        KernelArchive {
            url: format!("{}/kata-static.tar.gz", server.uri()),
            entry: ENTRY.to_string(),
            sha256: Some(good.to_uppercase()),
        },
    )
    .unwrap();
    let resolved = ok.resolve(None).await.unwrap();
    assert_eq!(fs::read(resolved).unwrap(), KERNEL);
}
