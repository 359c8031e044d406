//! Output capture and selection.

use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK_SIZE: usize = 8192;

/// Read a child pipe to EOF in fixed-size chunks.
pub(crate) async fn read_stream<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

/// Pick the text returned for a finished command.
///
/// - exit 0: stdout, or stderr when stdout is empty
/// - anything else: stdout followed by stderr, or a synthetic message when
///   both are empty
#[must_use]
pub fn render_output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> String {
    if exit_code == Some(0) {
        return if stdout.is_empty() { stderr } else { stdout }.to_string();
    }

    let combined = format!("{stdout}{stderr}");
    if !combined.is_empty() {
        return combined;
    }
    match exit_code {
        Some(code) => format!("Command exited with code {code}"),
        None => "Command terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_prefers_stdout() {
        assert_eq!(render_output(Some(0), "hello\n", "warning\n"), "hello\n");
        assert_eq!(render_output(Some(0), "", "cloning...\n"), "cloning...\n");
        assert_eq!(render_output(Some(0), "", ""), "");
    }

    #[test]
    fn test_failure_concatenates_streams() {
        assert_eq!(render_output(Some(1), "", "boom\n"), "boom\n");
        assert_eq!(render_output(Some(1), "out\n", "err\n"), "out\nerr\n");
    }

    #[test]
    fn test_failure_without_output_is_synthesized() {
        assert_eq!(render_output(Some(2), "", ""), "Command exited with code 2");
        assert_eq!(render_output(None, "", ""), "Command terminated by signal");
    }

    #[tokio::test]
    async fn test_read_stream_reads_past_one_chunk() {
        let data = vec![b'x'; READ_CHUNK_SIZE * 3 + 17];
        let out = read_stream(&data[..]).await.unwrap();
        assert_eq!(out.len(), data.len());
    }
}
