use {
    crate::{
        harness::Harness,
        random::{random_batch, random_content},
    },
    anyhow::{Result, bail, ensure},
    clap::Parser,
    fs_err as fs,
    sealpost::{cli::Cli, counters::Summary},
    sealpost_protocol::{
        CHUNK_SIZE, ContentHash,
        credentials::{KEY_LEN, TransferKey},
    },
    sealpost_sdk::{TransferError, crypto::HashingWriter},
    std::{
        collections::HashSet,
        io::{self, Read, Write},
        time::Duration,
    },
    tokio::time::sleep,
    tokio_util::sync::CancellationToken,
    tracing::info,
};

/// SHA-512 of `hi`.
const HI_HASH: &str = "150a14ed5bea6cc731cf86c41566ac427a8db48ef1b9fd626664b3bfbb99071f\
                       a4c922f33dde38719b8c8354e2b7ab9d77e0e67fc12843920a712e73d558e197";

fn hash_of(content: &[u8]) -> Result<ContentHash> {
    let mut writer = HashingWriter::new(io::sink());
    writer.write_all(content)?;
    Ok(writer.finish()?.1)
}

fn files(entries: &[(&str, &[u8])]) -> Vec<(String, Vec<u8>)> {
    entries
        .iter()
        .map(|(name, content)| ((*name).to_owned(), content.to_vec()))
        .collect()
}

/// Two files with the same content: only the first one crosses the wire.
pub async fn same_content_once(harness: &Harness) -> Result<()> {
    let client = harness.add_client(TransferKey::from_slice(&[0; KEY_LEN])?)?;
    let paths = harness.write_files(
        "same_content",
        &files(&[("a.txt", b"hi"), ("b.txt", b"hi")]),
    )?;
    let (result, summary) = harness.send(&client, &paths).await?;
    result?;
    ensure!(
        summary
            == Summary {
                transferred: 1,
                duplicate: 1,
                failed: Vec::new(),
                pending: 0,
            },
        "unexpected summary: {summary:?}"
    );

    let stored = harness.namespace(&client.identity)?.files()?;
    let [file] = stored.as_slice() else {
        bail!("expected one stored file, got {stored:?}");
    };
    ensure!(file.name == HI_HASH);
    ensure!(file.size == 2);
    let filename = file.provenance.as_ref().map(|provenance| provenance.filename.as_str());
    ensure!(filename == Some("a.txt"), "unexpected provenance: {filename:?}");
    Ok(())
}

/// Content stored by an earlier session from the same sender is skipped.
/// The second session goes through the command line entry point.
pub async fn dedup_across_sessions(harness: &Harness) -> Result<()> {
    let client = harness.add_client(TransferKey::generate())?;
    let first = harness.write_files("first", &files(&[("one.txt", b"one")]))?;
    let (result, summary) = harness.send(&client, &first).await?;
    result?;
    ensure!(summary.transferred == 1);

    let second = harness.write_files(
        "second",
        &files(&[("copy_of_one.txt", b"one"), ("two.txt", b"two")]),
    )?;
    let file_list = second
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(",");
    let cli = Cli::try_parse_from([
        "sealpost".to_owned(),
        "-f".to_owned(),
        file_list,
        "-r".to_owned(),
        harness.addr().to_string(),
        "-l".to_owned(),
        client.local.to_string(),
        "-k".to_owned(),
        client.key_path.display().to_string(),
    ])?;
    // Gives the first connection from this port time to be released.
    sleep(Duration::from_millis(100)).await;
    sealpost::run(cli, CancellationToken::new()).await?;

    let namespace = harness.namespace(&client.identity)?;
    let stored = namespace.files()?;
    ensure!(stored.len() == 2, "unexpected files: {stored:?}");
    let two = namespace.provenance(&hash_of(b"two")?.to_hex())?;
    ensure!(two.is_some_and(|provenance| provenance.filename == "two.txt"));
    let one = namespace.provenance(&hash_of(b"one")?.to_hex())?;
    ensure!(one.is_some_and(|provenance| provenance.filename == "one.txt"));
    Ok(())
}

/// A sender without a key is turned away and nothing is stored.
pub async fn unauthorized(harness: &Harness) -> Result<()> {
    let client = harness.unknown_client(TransferKey::generate())?;
    let paths = harness.write_files("unauthorized", &files(&[("secret.txt", b"secret")]))?;
    let (result, summary) = harness.send(&client, &paths).await?;
    ensure!(
        matches!(result, Err(TransferError::Unauthorized)),
        "unexpected result: {result:?}"
    );
    ensure!(summary.pending == 1);
    ensure!(!harness.has_namespace(&client.identity)?);
    Ok(())
}

/// After a burn the sender's key no longer works.
pub async fn burn(harness: &Harness) -> Result<()> {
    let client = harness.add_client(TransferKey::generate())?;
    harness.burn(&client).await?;
    ensure!(harness.keys()?.load_key(&client.identity)?.is_none());

    let paths = harness.write_files("after_burn", &files(&[("late.txt", b"late")]))?;
    let (result, _) = harness.send(&client, &paths).await?;
    ensure!(
        matches!(result, Err(TransferError::Unauthorized)),
        "unexpected result: {result:?}"
    );
    Ok(())
}

/// A session cut off mid-file is dropped on its own: nothing of the file is
/// kept and the receiver goes on serving the same and other senders.
pub async fn broken_session(harness: &Harness) -> Result<()> {
    let client = harness.add_client(TransferKey::generate())?;
    let content = vec![7; CHUNK_SIZE * 2];
    let paths = harness.write_files("broken", &files(&[("big.bin", content.as_slice())]))?;
    harness.abandon(&client, &paths).await?;
    ensure!(harness.is_serving(), "receiver stopped after a broken session");

    let namespace = harness.namespace(&client.identity)?;
    let left = fs::read_dir(namespace.dir())?.count();
    ensure!(left == 0, "{left} files left after a broken session");

    let (result, summary) = harness.send(&client, &paths).await?;
    result?;
    ensure!(summary.transferred == 1, "unexpected summary: {summary:?}");
    let mut stored = Vec::new();
    namespace.open_file(&hash_of(&content)?)?.read_to_end(&mut stored)?;
    ensure!(stored == content);

    let other = harness.add_client(TransferKey::generate())?;
    let (result, summary) = harness.send(&other, &paths).await?;
    result?;
    ensure!(summary.transferred == 1, "unexpected summary: {summary:?}");
    Ok(())
}

/// Several sessions of random files with repeated content. Every new
/// content is stored once and byte for byte.
pub async fn random_sessions(harness: &Harness, sessions: usize) -> Result<()> {
    let client = harness.add_client(TransferKey::generate())?;
    let mut sent: Vec<Vec<u8>> = vec![random_content()];
    let mut stored = HashSet::new();
    for session in 0..sessions {
        let batch = random_batch(&sent);
        let paths = harness.write_files(&format!("random{session}"), &batch)?;

        let mut expected = Summary::default();
        for (_, content) in &batch {
            if stored.insert(hash_of(content)?) {
                expected.transferred = expected.transferred.saturating_add(1);
            } else {
                expected.duplicate = expected.duplicate.saturating_add(1);
            }
        }
        let (result, summary) = harness.send(&client, &paths).await?;
        result?;
        ensure!(summary == expected, "session {session}: {summary:?} != {expected:?}");
        info!(session, files = batch.len(), ?summary, "random session done");
        sent.extend(batch.into_iter().map(|(_, content)| content));
    }

    let namespace = harness.namespace(&client.identity)?;
    ensure!(namespace.files()?.len() == stored.len());
    for content in &sent {
        let hash = hash_of(content)?;
        if !stored.contains(&hash) {
            continue;
        }
        let mut actual = Vec::new();
        namespace.open_file(&hash)?.read_to_end(&mut actual)?;
        ensure!(&actual == content, "stored content of {hash} differs");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn same_content_is_sent_once() {
        let harness = Harness::start().await.unwrap();
        same_content_once(&harness).await.unwrap();
        harness.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stored_content_is_skipped_in_later_sessions() {
        let harness = Harness::start().await.unwrap();
        dedup_across_sessions(&harness).await.unwrap();
        harness.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sender_without_key_is_rejected() {
        let harness = Harness::start().await.unwrap();
        unauthorized(&harness).await.unwrap();
        harness.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn burn_revokes_key() {
        let harness = Harness::start().await.unwrap();
        burn(&harness).await.unwrap();
        harness.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn broken_session_does_not_affect_others() {
        let harness = Harness::start().await.unwrap();
        broken_session(&harness).await.unwrap();
        harness.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn random_files() {
        let harness = Harness::start().await.unwrap();
        random_sessions(&harness, 5).await.unwrap();
        harness.stop().await.unwrap();
    }
}
