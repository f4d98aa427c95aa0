use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::context::RuntimeContext;
use crate::decision;
use crate::request::ParsedRequest;
use crate::smtp;
use crate::spool::LearningSpool;
use crate::store::AllowListStore;

/// Binds `ctx.config.host:port` and serves policy requests until the
/// listener fails. Each connection carries exactly one request and one
/// response line, then the connection closes; concurrency is bounded by
/// `ctx.config.max_connections` via a semaphore, not by any shared
/// in-memory policy state (all coordination happens through the store and
/// spool on disk).
pub async fn run(ctx: Arc<RuntimeContext>) -> Result<()> {
    let store = Arc::new(AllowListStore::new(ctx.config.config_dir.clone()));
    let spool = Arc::new(LearningSpool::new(
        ctx.config.spool_dir.clone(),
        ctx.config.learning_period,
    ));
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_connections));

    let addr = (ctx.config.host.as_str(), ctx.config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}:{}", ctx.config.host, ctx.config.port))?;
    info!("postwhite listening on {}:{}", ctx.config.host, ctx.config.port);

    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let ctx = ctx.clone();
        let store = store.clone();
        let spool = spool.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = handle_connection(ctx, store, spool, stream).await {
                warn!("connection from {} failed: {}", peer, err);
            }
        });
    }
}

async fn handle_connection(
    ctx: Arc<RuntimeContext>,
    store: Arc<AllowListStore>,
    spool: Arc<LearningSpool>,
    stream: TcpStream,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let Some(raw) = postwhite_proto::read_raw_request(&mut reader).await? else {
        return Ok(());
    };

    let parsed = ParsedRequest::from_raw(&raw);
    let outcome = decision::decide(&ctx, &store, &spool, &parsed);

    write_half
        .write_all(&outcome.action.to_response())
        .await
        .context("writing policy response")?;
    write_half.flush().await.context("flushing policy response")?;

    // Outbound mail delivery never changes the response already sent; a
    // failure here is only logged.
    if let Some(mail) = outcome.mail {
        if let Err(err) = smtp::submit(&ctx.config.smtp_host, ctx.config.smtp_port, &mail).await {
            error!("failed to deliver advisory mail to {}: {}", mail.to, err);
        }
    }

    Ok(())
}
