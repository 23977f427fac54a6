// ============================================================
// Layer 5 — Sentence Pooler
// ============================================================
// Reduces token states [batch, seq_len, hidden] to one vector
// per example [batch, hidden]. The strategy is picked once, when
// the hyperparameters are parsed (PoolingStrategy), and dispatched
// here with a single match.
//
//   default — the encoder's native sentence embedding
//   max     — elementwise max, pad positions pushed to NEG_FILL
//   avg     — mean over real tokens only
//   cls     — position 0

use burn::prelude::*;

use crate::domain::{
    error::{ModelError, ModelResult},
    hparams::PoolingStrategy,
};

/// Stand-in for −∞ at padding positions; finite so masked
/// arithmetic never produces NaN.
const NEG_FILL: f32 = -1.0e9;

pub fn pool<B: Backend>(
    strategy:       PoolingStrategy,
    input_ids:      Tensor<B, 2, Int>,
    embeddings:     Tensor<B, 3>,
    attention_mask: Tensor<B, 2, Int>,
    pad_token_id:   u32,
    sentemb:        Option<Tensor<B, 2>>,
) -> ModelResult<Tensor<B, 2>> {
    match strategy {
        PoolingStrategy::Default => sentemb.ok_or_else(|| {
            ModelError::InvalidConfiguration(
                "pool 'default' needs an encoder with a native sentence embedding".to_string(),
            )
        }),
        PoolingStrategy::Max => Ok(max_pooling(input_ids, embeddings, pad_token_id)),
        PoolingStrategy::Avg => Ok(average_pooling(input_ids, embeddings, attention_mask, pad_token_id)),
        PoolingStrategy::Cls => Ok(cls_pooling(embeddings)),
    }
}

/// Elementwise max over the sequence, ignoring pad-token positions.
pub fn max_pooling<B: Backend>(
    input_ids:    Tensor<B, 2, Int>,
    embeddings:   Tensor<B, 3>,
    pad_token_id: u32,
) -> Tensor<B, 2> {
    let [batch_size, seq_len, hidden] = embeddings.dims();
    let pad = input_ids
        .equal_elem(pad_token_id as i32)
        .float()
        .reshape([batch_size, seq_len, 1]);
    let keep = pad.clone().neg().add_scalar(1.0);

    (embeddings * keep + pad.mul_scalar(NEG_FILL))
        .max_dim(1)
        .reshape([batch_size, hidden])
}

/// Mean over positions whose attention mask is set and whose token is
/// not the pad id. Padding touches neither the sum nor the count.
pub fn average_pooling<B: Backend>(
    input_ids:      Tensor<B, 2, Int>,
    embeddings:     Tensor<B, 3>,
    attention_mask: Tensor<B, 2, Int>,
    pad_token_id:   u32,
) -> Tensor<B, 2> {
    let [batch_size, seq_len, hidden] = embeddings.dims();
    let attended = attention_mask.equal_elem(0).bool_not().float();
    let not_pad  = input_ids.equal_elem(pad_token_id as i32).bool_not().float();
    let keep = (attended * not_pad).reshape([batch_size, seq_len, 1]);

    let summed = (embeddings * keep.clone())
        .sum_dim(1)
        .reshape([batch_size, hidden]);
    let counts = keep
        .sum_dim(1)
        .reshape([batch_size, 1])
        .clamp_min(1.0);

    summed / counts
}

pub fn cls_pooling<B: Backend>(embeddings: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch_size, _, hidden] = embeddings.dims();
    embeddings
        .slice([0..batch_size, 0..1, 0..hidden])
        .reshape([batch_size, hidden])
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::TensorData};

    type TestBackend = NdArray;

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
        }
    }

    /// One example, three positions, hidden size 2.
    fn embeddings(rows: [[f32; 2]; 3]) -> Tensor<TestBackend, 3> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [1, 3, 2]), &Default::default())
    }

    fn ints(row: [i32; 3]) -> Tensor<TestBackend, 2, Int> {
        Tensor::from_ints([row], &Default::default())
    }

    #[test]
    fn test_average_without_padding_is_plain_mean() {
        let emb = embeddings([[1.0, 2.0], [3.0, 4.0], [5.0, 9.0]]);
        let out = average_pooling(ints([4, 5, 6]), emb, ints([1, 1, 1]), 0);
        assert_close(&values(out), &[3.0, 5.0]);
    }

    #[test]
    fn test_average_ignores_padding() {
        let emb = embeddings([[1.0, 2.0], [3.0, 4.0], [1000.0, -1000.0]]);
        let out = average_pooling(ints([4, 5, 0]), emb, ints([1, 1, 0]), 0);
        assert_close(&values(out), &[2.0, 3.0]);
    }

    #[test]
    fn test_max_never_picks_padding() {
        // True maximum of each column sits in the padded tail.
        let emb = embeddings([[1.0, -3.0], [2.0, -4.0], [50.0, 60.0]]);
        let out = max_pooling(ints([4, 5, 0]), emb, 0);
        assert_close(&values(out), &[2.0, -3.0]);
    }

    #[test]
    fn test_cls_takes_first_position() {
        let emb = embeddings([[7.0, 8.0], [3.0, 4.0], [5.0, 6.0]]);
        assert_close(&values(cls_pooling(emb)), &[7.0, 8.0]);
    }

    #[test]
    fn test_default_requires_native_embedding() {
        let emb = embeddings([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let err = pool(PoolingStrategy::Default, ints([1, 2, 3]), emb.clone(), ints([1, 1, 1]), 0, None)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfiguration(_)));

        let native = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.25]], &Default::default());
        let out = pool(PoolingStrategy::Default, ints([1, 2, 3]), emb, ints([1, 1, 1]), 0, Some(native))
            .unwrap();
        assert_close(&values(out), &[0.5, 0.25]);
    }
}
