//! Infrastructure implementation of the `Prompter` port.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::application::ports::Prompter;

/// Asks on stdout and reads exactly one line from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    async fn confirm(&self, question: &str) -> Result<bool> {
        let mut stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        ask(question, &mut stdin, &mut stdout).await
    }
}

async fn ask<R, W>(question: &str, input: &mut R, output: &mut W) -> Result<bool>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(format!("{question} (y/N): ").as_bytes())
        .await
        .context("writing prompt")?;
    output.flush().await.context("flushing prompt")?;

    let line = read_line_unbuffered(input).await.context("reading answer")?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Read up to and including the next `\n`, one byte at a time, so input
/// after the answer stays in the stream. EOF ends the line.
async fn read_line_unbuffered<R>(input: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if input.read(&mut byte).await? == 0 || byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
