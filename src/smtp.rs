use anyhow::{bail, Context, Result};
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::command::OutboundMail;

/// A minimal synchronous-per-connection RFC 5321 submission client.
///
/// No STARTTLS, no SASL auth, no connection pooling. The relay is assumed
/// to be a local, trusted MTA; this just needs to get an RFC 822 blob from
/// the daemon to the next hop.
pub async fn submit(smtp_host: &str, smtp_port: u16, mail: &OutboundMail) -> Result<()> {
    let stream = TcpStream::connect((smtp_host, smtp_port))
        .await
        .with_context(|| format!("connecting to {}:{}", smtp_host, smtp_port))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    expect_reply(&mut reader, "220").await?;

    write_line(&mut write_half, "EHLO postwhite").await?;
    expect_reply(&mut reader, "250").await?;

    write_line(&mut write_half, &format!("MAIL FROM:<{}>", extract_address(&mail.from))).await?;
    expect_reply(&mut reader, "250").await?;

    write_line(&mut write_half, &format!("RCPT TO:<{}>", extract_address(&mail.to))).await?;
    expect_reply(&mut reader, "250").await?;

    write_line(&mut write_half, "DATA").await?;
    expect_reply(&mut reader, "354").await?;

    let body = dot_stuff(&mail.to_rfc822());
    write_half
        .write_all(body.as_bytes())
        .await
        .context("writing message body")?;
    write_line(&mut write_half, ".").await?;
    expect_reply(&mut reader, "250").await?;

    write_line(&mut write_half, "QUIT").await?;
    let _ = expect_reply(&mut reader, "221").await;

    Ok(())
}

/// Postfix and most MTAs will accept a bare address inside the `From`/`To`
/// header value too, but envelope commands want just the address.
fn extract_address(header_value: &str) -> String {
    if let (Some(start), Some(end)) = (header_value.find('<'), header_value.find('>')) {
        if start < end {
            return header_value[start + 1..end].to_string();
        }
    }
    header_value.to_string()
}

/// Escapes leading dots per RFC 5321 §4.5.2 so a body line of exactly `.`
/// doesn't prematurely terminate the DATA block.
fn dot_stuff(body: &str) -> String {
    body.lines()
        .map(|line| {
            if let Some(stripped) = line.strip_prefix('.') {
                format!(".{}", stripped)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
        + "\r\n"
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    debug!("smtp > {}", line);
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    Ok(())
}

async fn expect_reply<R>(reader: &mut R, code: &str) -> Result<()>
where
    R: AsyncBufReadExt + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            bail!("connection closed while awaiting {} reply", code);
        }
        debug!("smtp < {}", line.trim_end());
        if !line.starts_with(code) {
            bail!("unexpected SMTP reply: {:?} (wanted {})", line.trim_end(), code);
        }
        // A multi-line reply continues with "code-..."; only a line with
        // "code " (a space, not a dash) in position 4 ends the block.
        if line.as_bytes().get(3) == Some(&b' ') {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_address_from_display_name_header() {
        assert_eq!(
            extract_address("Postwhite <postwhite@dent.tld>"),
            "postwhite@dent.tld"
        );
    }

    #[test]
    fn extracts_address_with_no_display_name() {
        assert_eq!(extract_address("hitchhike@dent.tld"), "hitchhike@dent.tld");
    }

    #[test]
    fn dot_stuffs_leading_dot_lines() {
        let stuffed = dot_stuff("Subject: x\r\n.\r\nbody");
        assert!(stuffed.contains("..\r\n"));
    }
}
