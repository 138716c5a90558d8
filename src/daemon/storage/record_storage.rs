use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use fs4::tokio::AsyncFileExt;
use futures::{stream, StreamExt, TryStreamExt};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
    sync::RwLock,
};
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, info, warn};

use crate::{
    fs::operations::read_last_line,
    utils::time::{date_to_record_name, record_name_to_date},
};

use super::entities::ActivityRecord;

/// Interface for abstracting storage of records.
pub trait ActivityStore {
    /// Appends a record to the file of the record's day.
    fn append(&self, record: ActivityRecord) -> impl Future<Output = Result<()>>;

    /// Records with `since <= timestamp <= until`, ordered by timestamp.
    fn query(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityRecord>>> + Send;

    /// Deletes every record older than `older_than` and returns how many were removed.
    fn prune(&self, older_than: DateTime<Utc>) -> impl Future<Output = Result<usize>>;
}

impl<T: Deref> ActivityStore for T
where
    T::Target: ActivityStore,
{
    fn append(&self, record: ActivityRecord) -> impl Future<Output = Result<()>> {
        self.deref().append(record)
    }

    fn query(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityRecord>>> + Send {
        self.deref().query(since, until)
    }

    fn prune(&self, older_than: DateTime<Utc>) -> impl Future<Output = Result<usize>> {
        self.deref().prune(older_than)
    }
}

/// The main realization of [ActivityStore].
pub struct ActivityStoreImpl {
    record_dir: PathBuf,
    // Writers (appends and retention rewrites) exclude each other and readers inside the
    // process. Other processes are kept out by file locks.
    guard: RwLock<()>,
}

impl ActivityStoreImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self {
            record_dir,
            guard: RwLock::new(()),
        })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    async fn read_day(path: &Path) -> Result<Vec<ActivityRecord>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<ActivityRecord>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let mut reader = BufReader::new(file);
            // Lines are split on raw bytes, one that isn't valid UTF-8 must not hide the rest.
            let mut line = Vec::new();
            let mut records = vec![];
            let read = loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break Ok(()),
                    Ok(_) => {
                        let content = line.strip_suffix(b"\n").unwrap_or(&line);
                        if content.is_empty() {
                            continue;
                        }
                        match serde_json::from_slice::<ActivityRecord>(content) {
                            Ok(v) => records.push(v),
                            Err(e) => {
                                // ignore illegal values. Might happen after shutdowns
                                warn!("During parsing in path {:?} found illegal json string: {e}", path)
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Reading {path:?} failed after {} records: {e}", records.len());
                        break Err(e);
                    }
                }
            };

            reader.into_inner().unlock_async().await?;
            read?;

            Ok(records)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }

    /// Keeps only records at or after `older_than`. The new content is written next to the
    /// original and renamed over it, so readers see either the old or the new file.
    async fn rewrite_day(path: &Path, older_than: DateTime<Utc>) -> Result<usize> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        file.lock_exclusive()?;
        let result = Self::rewrite_locked(path, older_than).await;
        file.unlock_async().await?;
        result
    }

    async fn rewrite_locked(path: &Path, older_than: DateTime<Utc>) -> Result<usize> {
        let mut contents = Vec::new();
        File::open(path).await?.read_to_end(&mut contents).await?;

        let mut kept = Vec::<u8>::new();
        let mut removed = 0;
        for line in contents.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            match serde_json::from_slice::<ActivityRecord>(line) {
                Ok(record) if record.timestamp >= older_than => {
                    kept.extend_from_slice(line);
                    kept.push(b'\n');
                }
                Ok(_) => removed += 1,
                Err(e) => warn!("Dropping unreadable line from {path:?}: {e}"),
            }
        }

        if removed == 0 && kept.len() == contents.len() {
            return Ok(0);
        }

        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        let mut temp = File::create(&temp_path).await?;
        temp.write_all(&kept).await?;
        temp.sync_all().await?;
        drop(temp);
        tokio::fs::rename(&temp_path, path).await?;
        Ok(removed)
    }
}

impl ActivityStore for ActivityStoreImpl {
    async fn append(&self, record: ActivityRecord) -> Result<()> {
        let _guard = self.guard.write().await;
        let path = self.day_path(record.timestamp.date_naive());

        let file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(path)
            .await?;

        ActivityRecordFile::new(file).append(&[record]).await
    }

    async fn query(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>> {
        if since > until {
            return Ok(vec![]);
        }
        let _guard = self.guard.read().await;

        let paths: Vec<PathBuf> = since
            .date_naive()
            .iter_days()
            .take_while(|day| *day <= until.date_naive())
            .map(|day| self.day_path(day))
            .collect();

        let days: Vec<Vec<ActivityRecord>> = stream::iter(paths)
            .map(|path| async move { Self::read_day(&path).await })
            .buffered(4)
            .try_collect()
            .await?;

        let mut records: Vec<ActivityRecord> = days
            .into_iter()
            .flatten()
            .filter(|r| r.timestamp >= since && r.timestamp <= until)
            .collect();
        // Day files are already ordered unless the wall clock stepped back.
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let _guard = self.guard.write().await;
        let cutoff_day = older_than.date_naive();

        let mut entries = ReadDirStream::new(tokio::fs::read_dir(&self.record_dir).await?);
        let mut removed = 0;
        while let Some(entry) = entries.next().await {
            let path = entry?.path();
            let Some(day) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(record_name_to_date)
            else {
                continue;
            };

            if day < cutoff_day {
                removed += Self::read_day(&path).await?.len();
                tokio::fs::remove_file(&path).await?;
                debug!("Removed record file {path:?}");
            } else if day == cutoff_day {
                removed += Self::rewrite_day(&path, older_than).await?;
            }
        }

        if removed > 0 {
            info!("Pruned {removed} records older than {older_than}");
        }
        Ok(removed)
    }
}

/// Handle to a single day file.
pub struct ActivityRecordFile {
    file: File,
}

impl ActivityRecordFile {
    fn new(file: File) -> Self {
        Self { file }
    }

    pub async fn append(&mut self, records: &[ActivityRecord]) -> Result<()> {
        // Semi-safe acquire-release for a file
        self.file.lock_exclusive()?;
        let result = Self::append_with_file(&mut self.file, records).await;
        self.file.unlock_async().await?;
        result
    }

    /// An interrupted write can leave a partial line at the end of the file. It is cut off so
    /// that the next record starts on a fresh line.
    async fn repair_tail(file: &mut File) -> Result<()> {
        let end = file.seek(std::io::SeekFrom::End(0)).await?;
        if end == 0 {
            return Ok(());
        }

        let last_line = read_last_line(file).await?;
        if last_line.ends_with(b"\n") {
            return Ok(());
        }

        if serde_json::from_slice::<ActivityRecord>(&last_line).is_ok() {
            file.write_all(b"\n").await?;
        } else {
            // Might happen due to shutdown cutting of the write into a file.
            warn!("Last record was corrupted, truncating {} bytes", last_line.len());
            file.set_len(end - last_line.len() as u64).await?;
        }
        Ok(())
    }

    async fn append_with_file(file: &mut File, records: &[ActivityRecord]) -> Result<()> {
        Self::repair_tail(file).await?;

        let mut buffer = Vec::<u8>::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        file.seek(std::io::SeekFrom::End(0)).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::{tempdir, tempfile};
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use super::*;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE) + Duration::seconds(seconds)
    }

    fn record(seconds: i64, title: &str) -> ActivityRecord {
        ActivityRecord::new(at(seconds), title, seconds as u32)
    }

    async fn file_contents(file: &mut File) -> Result<String> {
        file.rewind().await?;
        let mut s = String::new();
        file.read_to_string(&mut s).await?;
        Ok(s)
    }

    #[tokio::test]
    async fn test_appender_basic() -> Result<()> {
        let file = File::from_std(tempfile()?);
        let mut handle = ActivityRecordFile::new(file);

        handle.append(&[record(0, "initial")]).await?;
        handle.append(&[record(1, "window"), record(2, "third")]).await?;

        let s = file_contents(&mut handle.file).await?;
        assert_eq!(s.lines().count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_appender_repairs_torn_tail() -> Result<()> {
        let mut previous = serde_json::to_string(&record(0, "initial"))?;
        previous.push('\n');
        previous += r#"{"timestamp":1530662401000,"tit"#;

        let mut file = tempfile()?;
        file.write_all(previous.as_bytes())?;
        let mut handle = ActivityRecordFile::new(File::from_std(file));

        handle.append(&[record(2, "after crash")]).await?;

        let s = file_contents(&mut handle.file).await?;
        let parsed: Vec<ActivityRecord> = s
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(parsed, vec![record(0, "initial"), record(2, "after crash")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_appender_repairs_missing_newline() -> Result<()> {
        // A complete record whose newline never made it to disk.
        let previous = serde_json::to_string(&record(0, "initial"))?;
        let mut file = tempfile()?;
        file.write_all(previous.as_bytes())?;
        let mut handle = ActivityRecordFile::new(File::from_std(file));

        handle.append(&[record(1, "next")]).await?;

        let s = file_contents(&mut handle.file).await?;
        assert_eq!(
            s,
            format!("{previous}\n{}\n", serde_json::to_string(&record(1, "next"))?)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_append_and_query() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        let records = [record(0, "a"), record(10, "b"), record(20, "c")];
        for r in records.iter().cloned() {
            storage.append(r).await?;
        }

        assert_eq!(storage.query(at(0), at(20)).await?, records.to_vec());
        assert_eq!(storage.query(at(5), at(15)).await?, vec![records[1].clone()]);
        assert_eq!(storage.query(at(21), at(100)).await?, vec![]);
        assert_eq!(storage.query(at(20), at(0)).await?, vec![]);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_query_spans_days_in_order() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        let day = 24 * 60 * 60;
        let records = [
            record(-10, "yesterday"),
            record(5, "today"),
            record(day + 5, "tomorrow"),
        ];
        for r in records.iter().cloned() {
            storage.append(r).await?;
        }

        assert_eq!(std::fs::read_dir(dir.path())?.count(), 3);
        assert_eq!(storage.query(at(-day), at(2 * day)).await?, records.to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_query_orders_out_of_order_appends() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        storage.append(record(10, "later")).await?;
        storage.append(record(5, "clock stepped back")).await?;

        let values = storage.query(at(0), at(60)).await?;
        assert_eq!(values, vec![record(5, "clock stepped back"), record(10, "later")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_prune_removes_only_old_records() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        let day = 24 * 60 * 60;
        let records = [
            record(-day, "two days ago"),
            record(100, "old"),
            record(200, "at cutoff"),
            record(300, "young"),
            record(day + 1, "tomorrow"),
        ];
        for r in records.iter().cloned() {
            storage.append(r).await?;
        }

        let removed = storage.prune(at(200)).await?;
        assert_eq!(removed, 2);
        assert_eq!(
            storage.query(at(-2 * day), at(2 * day)).await?,
            records[2..].to_vec()
        );
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 2);

        // Pruning again changes nothing.
        assert_eq!(storage.prune(at(200)).await?, 0);
        assert_eq!(
            storage.query(at(-2 * day), at(2 * day)).await?,
            records[2..].to_vec()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_appends_after_prune() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        storage.append(record(0, "old")).await?;
        storage.append(record(10, "young")).await?;
        storage.prune(at(5)).await?;
        storage.append(record(20, "newest")).await?;

        assert_eq!(
            storage.query(at(0), at(60)).await?,
            vec![record(10, "young"), record(20, "newest")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_prune_concurrent_with_appends() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        for i in 0..10 {
            storage.append(record(i, "old")).await?;
        }

        let appends = async {
            for i in 100..120 {
                storage.append(record(i, "new")).await?;
            }
            anyhow::Ok(())
        };
        let prunes = async {
            for _ in 0..5 {
                storage.prune(at(50)).await?;
                tokio::task::yield_now().await;
            }
            anyhow::Ok(())
        };
        let (appended, pruned) = tokio::join!(appends, prunes);
        appended?;
        pruned?;

        let values = storage.query(at(0), at(200)).await?;
        assert_eq!(values.len(), 20);
        assert!(values.iter().all(|r| r.timestamp >= at(100)));
        Ok(())
    }

    #[tokio::test]
    async fn test_store_skips_unreadable_lines() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        storage.append(record(0, "a")).await?;
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(dir.path().join(date_to_record_name(TEST_START_DATE.date())))?;
            file.write_all(b"garbage\n")?;
        }
        storage.append(record(1, "b")).await?;

        assert_eq!(
            storage.query(at(0), at(10)).await?,
            vec![record(0, "a"), record(1, "b")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_reads_past_invalid_utf8() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;
        storage.append(record(0, "a")).await?;
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(dir.path().join(date_to_record_name(TEST_START_DATE.date())))?;
            file.write_all(b"{\"timestamp\":1530662401000,\"title\":\"\xff\xfe\"}\n")?;
        }
        storage.append(record(2, "b")).await?;
        storage.append(record(3, "c")).await?;

        assert_eq!(
            storage.query(at(0), at(10)).await?,
            vec![record(0, "a"), record(2, "b"), record(3, "c")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_works_through_arc() -> Result<()> {
        let dir = tempdir()?;
        let storage = std::sync::Arc::new(ActivityStoreImpl::new(dir.path().to_owned())?);
        storage.append(record(0, "a")).await?;
        assert_eq!(storage.query(at(0), at(0)).await?.len(), 1);
        Ok(())
    }
}
