//! 学習／評価用のインデックス分割。
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Serialize;
use tracing::warn;

use super::EvaluationError;

/// ホールドアウト分割。インデックスは元データの行番号。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// シード付きの置換で `ceil(test_size * n)` 件を評価側に回す。
///
/// # Errors
/// `test_size` が (0, 1) の外、またはどちらかの側が空になる場合はエラーを返す。
pub fn train_test_split(
    n_samples: usize,
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit, EvaluationError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(EvaluationError::InvalidTestSize(test_size));
    }
    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(EvaluationError::EmptySplit {
            samples: n_samples,
            test_size,
        });
    }

    let mut permutation: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);
    let train = permutation.split_off(n_test);
    Ok(TrainTestSplit {
        train,
        test: permutation,
    })
}

/// シャッフルなしの層化 k 分割。
///
/// クラスは出現順に番号を振り、ソート済みラベル列を k 個おきに数えた件数を
/// 各分割の割り当てとする。各クラスの行は元の順序のまま先頭の分割から埋める。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    /// # Errors
    /// `n_splits` が2未満の場合はエラーを返す。
    pub fn new(n_splits: usize) -> Result<Self, EvaluationError> {
        if n_splits < 2 {
            return Err(EvaluationError::InvalidFolds(n_splits));
        }
        Ok(Self { n_splits })
    }

    #[must_use]
    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// 各サンプルが評価側に入る分割番号。
    ///
    /// # Errors
    /// サンプル数が分割数より少ない場合、または全クラスが分割数未満の場合はエラーを返す。
    pub fn test_folds(&self, labels: &[usize]) -> Result<Vec<usize>, EvaluationError> {
        let n_samples = labels.len();
        if self.n_splits > n_samples {
            return Err(EvaluationError::TooFewSamples {
                samples: n_samples,
                folds: self.n_splits,
            });
        }

        // 出現順のクラス番号
        let mut first_seen: Vec<usize> = Vec::new();
        let encoded: Vec<usize> = labels
            .iter()
            .map(|label| {
                first_seen
                    .iter()
                    .position(|seen| seen == label)
                    .unwrap_or_else(|| {
                        first_seen.push(*label);
                        first_seen.len() - 1
                    })
            })
            .collect();
        let n_classes = first_seen.len();

        let mut counts = vec![0usize; n_classes];
        for &class in &encoded {
            counts[class] += 1;
        }
        if counts.iter().all(|&count| count < self.n_splits) {
            return Err(EvaluationError::AllClassesTooSmall {
                folds: self.n_splits,
            });
        }
        if let Some(&smallest) = counts.iter().min() {
            if smallest < self.n_splits {
                warn!(
                    smallest_class = smallest,
                    n_splits = self.n_splits,
                    "the least populated class has fewer members than n_splits"
                );
            }
        }

        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; n_classes]; self.n_splits];
        for (position, &class) in sorted.iter().enumerate() {
            allocation[position % self.n_splits][class] += 1;
        }

        let mut folds_by_class: Vec<std::vec::IntoIter<usize>> = (0..n_classes)
            .map(|class| {
                (0..self.n_splits)
                    .flat_map(|fold| std::iter::repeat_n(fold, allocation[fold][class]))
                    .collect::<Vec<_>>()
                    .into_iter()
            })
            .collect();
        Ok(encoded
            .iter()
            .map(|&class| folds_by_class[class].next().unwrap_or_default())
            .collect())
    }

    /// `(学習側, 評価側)` のインデックス組を分割ごとに返す。どちらも昇順。
    ///
    /// # Errors
    /// [`StratifiedKFold::test_folds`] と同じ条件でエラーを返す。
    pub fn split(&self, labels: &[usize]) -> Result<Vec<(Vec<usize>, Vec<usize>)>, EvaluationError> {
        let folds = self.test_folds(labels)?;
        Ok((0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&index| folds[index] == fold);
                (train, test)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn holdout_split_is_seeded_and_complete() {
        let first = train_test_split(10, 0.2, 0).expect("split");
        let second = train_test_split(10, 0.2, 0).expect("split");
        assert_eq!(first, second);
        assert_eq!(first.test.len(), 2);
        assert_eq!(first.train.len(), 8);

        let mut all: Vec<usize> = first.train.iter().chain(&first.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[rstest]
    #[case(11, 3)]
    #[case(62, 13)]
    #[case(5, 1)]
    fn holdout_test_size_rounds_up(#[case] n: usize, #[case] expected: usize) {
        assert_eq!(train_test_split(n, 0.2, 7).expect("split").test.len(), expected);
    }

    #[test]
    fn holdout_rejects_degenerate_sizes() {
        assert_eq!(
            train_test_split(10, 1.0, 0).expect_err("size"),
            EvaluationError::InvalidTestSize(1.0)
        );
        assert!(matches!(
            train_test_split(1, 0.2, 0),
            Err(EvaluationError::EmptySplit { .. })
        ));
    }

    #[test]
    fn stratified_folds_follow_round_robin_allocation() {
        let labels = [1, 1, 0, 0, 1, 1, 0, 0, 1, 1];
        let kfold = StratifiedKFold::new(2).expect("folds");
        assert_eq!(kfold.n_splits(), 2);

        let folds = kfold.test_folds(&labels).expect("folds");

        // クラス1（先に出現）6件 → [3, 3]、クラス0 4件 → [2, 2]
        assert_eq!(folds, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn split_covers_every_sample_once() {
        let labels: Vec<usize> = (0..23).map(|i| i % 3).collect();
        let kfold = StratifiedKFold::new(5).expect("folds");
        let splits = kfold.split(&labels).expect("split");

        assert_eq!(splits.len(), 5);
        let mut seen = vec![0; labels.len()];
        for (train, test) in &splits {
            assert_eq!(train.len() + test.len(), labels.len());
            for &index in test {
                seen[index] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn stratified_errors() {
        let kfold = StratifiedKFold::new(5).expect("folds");
        assert_eq!(
            kfold.test_folds(&[0, 1, 0]).expect_err("few samples"),
            EvaluationError::TooFewSamples { samples: 3, folds: 5 }
        );
        assert_eq!(
            kfold.test_folds(&[0, 1, 2, 3, 0, 1]).expect_err("small classes"),
            EvaluationError::AllClassesTooSmall { folds: 5 }
        );
        assert_eq!(
            StratifiedKFold::new(1).expect_err("one fold"),
            EvaluationError::InvalidFolds(1)
        );
    }
}
