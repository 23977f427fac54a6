// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a CSV file on disk and a tensor batch.
//
//   data.csv
//       │
//       ▼
//   CsvSampleReader   → ordered Samples (field → text / number)
//       │
//       ▼
//   SampleEncoder     → token ids per text field, [CLS] … [SEP]
//       │
//       ▼
//   EncodedDataset    → implements Burn's Dataset trait
//       │
//       ▼
//   RegressionBatcher → dynamic padding, masks, targets
//       │
//       ▼
//   DataLoader        → feeds batches to the trainer
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads CSV files into Samples
pub mod reader;

/// Tokenization and Burn's Dataset trait
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded overfit-monitor subset
pub mod splitter;
