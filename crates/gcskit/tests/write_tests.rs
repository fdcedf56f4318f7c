//! Write-path tests: the buffered writer, the resumable-upload state
//! machine and its recovery branches, appendable files, and directory
//! creation.

mod common;


use common::*;
use gcskit::{Error, RetryConfig};

fn upload_init(name: &str, length: u64) -> Expect {
    Expect::post(&upload_api(&format!(
        "/b/bucket/o?uploadType=resumable&name={name}"
    )))
    .header("X-Upload-Content-Length", &length.to_string())
    .resp_header("Location", "https://custom/upload/location")
}

#[tokio::test]
async fn writable_file_uploads_and_purges_read_cache() {
    let fake = FakeTransport::new(vec![
        // Fill the block cache through a reader first.
        Expect::get(&object_meta("bucket", "path%2Fwriteable")).respond(&stat_body(16, 1)),
        Expect::get(&media_url("/bucket/path%2Fwriteable"))
            .range(0, 7)
            .respond("01234567"),
        // Flush of the writer.
        upload_init("path%2Fwriteable", 17).timeouts(5, 1, 10),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .timeouts(5, 1, 30)
            .body(b"content1,content2"),
        // The flush invalidated the path; re-reading goes back to the
        // origin and sees the new generation.
        Expect::get(&object_meta("bucket", "path%2Fwriteable")).respond(&stat_body(33, 2)),
        Expect::get(&media_url("/bucket/path%2Fwriteable"))
            .range(0, 7)
            .respond("01234567"),
    ]);
    let mut options = test_options();
    options.block_size = 8;
    options.max_bytes = 8;
    options.stat_cache_max_age_secs = 3600;
    let fs = make_fs(fake.clone(), options);

    let reader = fs
        .new_random_access_file("gs://bucket/path/writeable")
        .await
        .unwrap();
    assert_eq!(reader.read_at(0, 4).await.unwrap(), b"0123");

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable")
        .await
        .unwrap();
    writer.append(b"content1,").unwrap();
    assert_eq!(writer.tell(), 9);
    writer.append(b"content2").unwrap();
    writer.flush().await.unwrap();

    // Re-reading after the flush issues fresh requests.
    assert_eq!(reader.read_at(0, 4).await.unwrap(), b"0123");

    // Not dirty anymore: no further uploads.
    writer.flush().await.unwrap();
    writer.sync().await.unwrap();
    writer.close().await.unwrap();
    fake.assert_done();
}

#[tokio::test]
async fn resumable_upload_resumes_after_probes() {
    let fake = FakeTransport::new(vec![
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2")
            .status(503),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes */17")
            .body(b"")
            .status(308)
            .resp_header("Range", "0-10"),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 11-16/17")
            .body(b"ntent2")
            .status(503),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes */17")
            .status(308)
            .resp_header("Range", "bytes=0-12"),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 13-16/17")
            .body(b"ent2")
            .status(308),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes */17")
            .status(308)
            .resp_header("Range", "bytes=0-14"),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 15-16/17")
            .body(b"t2"),
    ]);
    let fs = make_fs(fake.clone(), test_options());

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable.txt")
        .await
        .unwrap();
    writer.append(b"content1,").unwrap();
    writer.append(b"content2").unwrap();
    writer.close().await.unwrap();
    fake.assert_done();
}

#[tokio::test]
async fn resumable_upload_completes_on_status_probe() {
    let fake = FakeTransport::new(vec![
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2")
            .status(503),
        // The server reports the upload actually landed.
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes */17")
            .status(201),
    ]);
    let fs = make_fs(fake.clone(), test_options());

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable.txt")
        .await
        .unwrap();
    writer.append(b"content1,").unwrap();
    writer.append(b"content2").unwrap();
    writer.close().await.unwrap();
    fake.assert_done();
}

#[tokio::test]
async fn resumable_upload_probe_without_range_restarts_from_zero() {
    let fake = FakeTransport::new(vec![
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2")
            .status(503),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes */17")
            .status(308),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2"),
    ]);
    let fs = make_fs(fake.clone(), test_options());

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable.txt")
        .await
        .unwrap();
    writer.append(b"content1,content2").unwrap();
    writer.close().await.unwrap();
    fake.assert_done();
}

#[tokio::test]
async fn resumable_upload_exhausts_retries() {
    let mut script = vec![
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2")
            .status(503),
    ];
    for _ in 0..2 {
        script.push(
            Expect::put("https://custom/upload/location")
                .header("Content-Range", "bytes */17")
                .status(308)
                .resp_header("Range", "0-10"),
        );
        script.push(
            Expect::put("https://custom/upload/location")
                .header("Content-Range", "bytes 11-16/17")
                .body(b"ntent2")
                .status(503),
        );
    }
    let fake = FakeTransport::new(script);
    let mut options = test_options();
    options.retry = RetryConfig::immediate(2);
    let fs = make_fs(fake.clone(), options);

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable.txt")
        .await
        .unwrap();
    writer.append(b"content1,").unwrap();
    writer.append(b"content2").unwrap();
    let err = writer.close().await.unwrap_err();
    let message = format!("{err}");
    assert!(matches!(err, Error::Aborted(_)), "{err}");
    assert!(
        message.contains("All 2 retry attempts failed. The last failure:"),
        "got: {message}"
    );
    assert!(message.contains("important HTTP error 503"), "got: {message}");
    fake.assert_done();

    // The destructor would retry the upload in the background; this test
    // only covers the bounded-retry surface.
    std::mem::forget(writer);
}

#[tokio::test]
async fn resumable_upload_probe_failures_share_the_retry_budget() {
    // A failed status probe and a failed PUT each cost one logical
    // attempt; mixing them must not stretch the budget. With two retries
    // allowed, the third failed attempt — wherever in its probe/PUT cycle
    // it fails — exhausts the budget.
    let fake = FakeTransport::new(vec![
        upload_init("path%2Fwriteable.txt", 17),
        // Attempt 1: the content PUT fails.
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2")
            .status(503),
        // Attempt 2: the probe itself fails.
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes */17")
            .status(503),
        // Attempt 3: the probe recovers but the PUT fails again.
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes */17")
            .status(308)
            .resp_header("Range", "0-10"),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 11-16/17")
            .body(b"ntent2")
            .status(503),
    ]);
    let mut options = test_options();
    options.retry = RetryConfig::immediate(2);
    let fs = make_fs(fake.clone(), options);

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable.txt")
        .await
        .unwrap();
    writer.append(b"content1,").unwrap();
    writer.append(b"content2").unwrap();
    let err = writer.close().await.unwrap_err();
    assert!(matches!(err, Error::Aborted(_)), "{err}");
    assert!(
        format!("{err}").contains("All 2 retry attempts failed. The last failure:"),
        "got: {err}"
    );
    // max_retries + 1 attempts consumed the whole script; nothing beyond
    // it was sent.
    fake.assert_done();

    std::mem::forget(writer);
}

#[tokio::test]
async fn upload_410_surfaces_unavailable_and_destructor_retries() {
    let fake = FakeTransport::new(vec![
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2")
            .status(410),
        // The drop-time best-effort close re-initiates and succeeds.
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2"),
    ]);
    let fs = make_fs(fake.clone(), test_options());

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable.txt")
        .await
        .unwrap();
    writer.append(b"content1,").unwrap();
    writer.append(b"content2").unwrap();

    let err = writer.close().await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)), "{err}");
    let message = format!("{err}");
    assert!(
        message.contains("Upload to gs://bucket/path/writeable.txt failed, caused by:"),
        "got: {message}"
    );
    assert!(message.contains("important HTTP error 410"), "got: {message}");
    assert!(
        message.contains("when uploading gs://bucket/path/writeable.txt"),
        "got: {message}"
    );

    drop(writer);
    fake.wait_done().await;
}

#[tokio::test]
async fn failed_close_can_be_retried() {
    // The first close dies on a dead session; a second explicit close
    // opens a fresh session and succeeds.
    let fake = FakeTransport::new(vec![
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2")
            .status(410),
        upload_init("path%2Fwriteable.txt", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2"),
    ]);
    let fs = make_fs(fake.clone(), test_options());

    let mut writer = fs
        .new_writable_file("gs://bucket/path/writeable.txt")
        .await
        .unwrap();
    writer.append(b"content1,content2").unwrap();
    assert!(writer.close().await.is_err());
    writer.close().await.unwrap();
    fake.assert_done();
}

#[tokio::test]
async fn writable_file_no_object_name() {
    let fake = FakeTransport::new(Vec::new());
    let fs = make_fs(fake.clone(), test_options());
    let err = fs.new_writable_file("gs://bucket/").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    fake.assert_done();
}

#[tokio::test]
async fn appendable_file_seeds_from_existing_content() {
    let fake = FakeTransport::new(vec![
        // Opening for append reads the current contents through the block
        // cache.
        Expect::get(&object_meta("bucket", "path%2Fappendable")).respond(&stat_body(8, 1)),
        Expect::get(&media_url("/bucket/path%2Fappendable"))
            .range(0, 31)
            .respond("content1,"),
        // Close uploads the merged buffer.
        upload_init("path%2Fappendable", 17),
        Expect::put("https://custom/upload/location")
            .header("Content-Range", "bytes 0-16/17")
            .body(b"content1,content2"),
        // After close the cache is purged; the next read re-stats and
        // refetches.
        Expect::get(&object_meta("bucket", "path%2Fappendable")).respond(&stat_body(8, 2)),
        Expect::get(&media_url("/bucket/path%2Fappendable"))
            .range(0, 31)
            .respond("01234567"),
    ]);
    let mut options = test_options();
    options.block_size = 32;
    options.max_bytes = 32;
    options.stat_cache_max_age_secs = 3600;
    let fs = make_fs(fake.clone(), options);

    let mut writer = fs
        .new_appendable_file("gs://bucket/path/appendable")
        .await
        .unwrap();
    writer.append(b"content2").unwrap();

    // The pre-read landed in the shared block cache; no extra request.
    let reader = fs
        .new_random_access_file("gs://bucket/path/appendable")
        .await
        .unwrap();
    assert_eq!(reader.read_at(0, 8).await.unwrap(), b"content1");

    writer.close().await.unwrap();
    assert_eq!(reader.read_at(0, 4).await.unwrap(), b"0123");
    fake.assert_done();
}

#[tokio::test]
async fn appendable_file_no_object_name() {
    let fake = FakeTransport::new(Vec::new());
    let fs = make_fs(fake.clone(), test_options());
    let err = fs.new_appendable_file("gs://bucket/").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    fake.assert_done();
}

#[tokio::test]
async fn create_dir_uploads_marker() {
    let fake = FakeTransport::new(vec![
        // Existence probe: no marker object, nothing under the prefix.
        Expect::get(&object_meta("bucket", "subpath%2F")).status(404),
        Expect::get(&api(
            "/b/bucket/o?fields=items%2Fname%2CnextPageToken&prefix=subpath%2F&maxResults=1",
        ))
        .respond("{}"),
        // Zero-length marker upload.
        upload_init("subpath%2F", 0),
        Expect::put("https://custom/upload/location").body(b""),
        // Second create finds the marker and refuses.
        Expect::get(&object_meta("bucket", "subpath%2F")).respond(&stat_body(0, 1)),
    ]);
    let fs = make_fs(fake.clone(), test_options());

    fs.create_dir("gs://bucket/subpath").await.unwrap();
    let err = fs.create_dir("gs://bucket/subpath/").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)), "{err}");
    assert!(format!("{err}").contains("gs://bucket/subpath/"));
    fake.assert_done();
}

#[tokio::test]
async fn create_dir_bucket() {
    let fake = FakeTransport::new(vec![
        Expect::get(&api("/b/bucket")).respond("{}"),
        Expect::get(&api("/b/bucket")).respond("{}"),
    ]);
    let fs = make_fs(fake.clone(), test_options());

    fs.create_dir("gs://bucket/").await.unwrap();
    fs.create_dir("gs://bucket").await.unwrap();
    fake.assert_done();
}

#[tokio::test]
async fn writer_tell_tracks_buffered_length() {
    let fake = FakeTransport::new(Vec::new());
    let fs = make_fs(fake.clone(), test_options());
    let mut writer = fs.new_writable_file("gs://bucket/file").await.unwrap();
    assert_eq!(writer.tell(), 0);
    writer.append(b"content1,").unwrap();
    assert_eq!(writer.tell(), 9);
    writer.append(b"content2").unwrap();
    assert_eq!(writer.tell(), 17);
    std::mem::forget(writer); // never closed; skip the drop-time upload
    fake.assert_done();
}
