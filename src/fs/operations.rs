use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Moves backwards in a file to beginning of a previous line.
/// The last byte before the cursor is never treated as a separator, so a trailing `\n` belongs to
/// the line it ends.
pub async fn seek_line_backwards(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<(), io::Error> {
    // For example: need_to_read_this\nwe_are_here_now\n
    let mut need_to_skip = 1usize;
    loop {
        let leftover = file.stream_position().await?;
        if leftover == 0 {
            return Ok(());
        }
        let next_chunk = u64::min(leftover, buffer.len() as u64) as usize;
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;

        file.read_exact(&mut buffer[..next_chunk]).await?;
        let iter = buffer[..next_chunk].iter().rev().enumerate();
        let iter = iter.skip(need_to_skip);
        for (index, value) in iter {
            if *value == b'\n' {
                file.seek(std::io::SeekFrom::Current(-(index as i64)))
                    .await?;
                return Ok(());
            }
        }

        need_to_skip = need_to_skip.saturating_sub(1);
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;
    }
}

/// Raw bytes of the last line including its `\n`, if it has one. The cursor ends up at the end
/// of the file. Bytes are returned as is, a torn write can cut a character in half.
pub async fn read_last_line(file: &mut (impl AsyncSeek + AsyncRead + Unpin)) -> Result<Vec<u8>, io::Error> {
    file.seek(std::io::SeekFrom::End(0)).await?;
    seek_line_backwards(file, &mut [0; 1024]).await?;
    let mut last_line = Vec::new();
    file.read_to_end(&mut last_line).await?;
    Ok(last_line)
}
