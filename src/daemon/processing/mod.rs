use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use super::storage::entities::ActivityRecord;

pub mod local_save;
pub mod module;

/// Represents collector of records. This module is responsible for receiving records and saving
/// them using various means.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<ActivityRecord>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<ActivityRecord>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    /// Runs until every sender is dropped. A failed record is logged and the next one is
    /// processed as usual.
    pub async fn run(mut self) -> Result<()> {
        while let Some(record) = self.receiver.recv().await {
            debug!("Processing record {:?}", record);
            let timestamp = record.timestamp;
            match self.processor.process_next(record).await {
                Ok(_) => {
                    info!("Processed record from {timestamp}")
                }
                Err(e) => {
                    error!("Error processing record from {timestamp}: {e:?}")
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    };

    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Default, Clone)]
    struct FlakyProcessor {
        seen: Arc<Mutex<Vec<ActivityRecord>>>,
        finalized: Arc<AtomicBool>,
    }

    impl EventProcessor for FlakyProcessor {
        async fn process_next(&mut self, message: ActivityRecord) -> Result<()> {
            if &*message.title == "broken" {
                return Err(anyhow!("disk full"));
            }
            self.seen.lock().unwrap().push(message);
            Ok(())
        }

        async fn finalize(&mut self) -> Result<()> {
            self.finalized.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_per_record() -> Result<()> {
        let (sender, receiver) = mpsc::channel(10);
        let at = Utc.timestamp_opt(1_530_662_400, 0).unwrap();
        for title in ["first", "broken", "third"] {
            sender.send(ActivityRecord::new(at, title, 0)).await?;
        }
        drop(sender);

        let processor = FlakyProcessor::default();
        ProcessingModule::new(receiver, processor.clone()).run().await?;

        let seen = processor.seen.lock().unwrap();
        let titles: Vec<&str> = seen.iter().map(|r| &*r.title).collect();
        assert_eq!(titles, vec!["first", "third"]);
        assert!(processor.finalized.load(Ordering::SeqCst));
        Ok(())
    }
}
