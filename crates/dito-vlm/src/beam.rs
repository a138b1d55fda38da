//! Beam search over a next-token scorer.

/// Produces the log-probabilities of the next token given the tokens so far.
pub trait TokenScorer {
    /// The error returned when scoring a prefix fails.
    type Error;

    /// Returns one log-probability per vocabulary entry.
    fn next_log_probs(&mut self, tokens: &[u32]) -> Result<Vec<f32>, Self::Error>;
}

/// Parameters of the beam search.
#[derive(Debug, Clone, Copy)]
pub struct BeamSearch {
    /// Number of hypotheses kept alive at every step.
    pub num_beams: usize,
    /// Maximum length of a sequence, prompt tokens included.
    pub max_length: usize,
    /// Exponent applied to the generated length when ranking finished hypotheses.
    pub length_penalty: f32,
    /// The token ending a sequence.
    pub eos_token_id: u32,
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    log_prob: f32,
}

#[derive(Debug)]
struct Finished {
    score: f32,
    tokens: Vec<u32>,
}

impl BeamSearch {
    /// Runs the search from the prompt tokens.
    ///
    /// # Returns
    ///
    /// The generated tokens of the best hypothesis, without the prompt and the end token.
    pub fn run<S: TokenScorer>(&self, scorer: &mut S, prompt: &[u32]) -> Result<Vec<u32>, S::Error> {
        let num_beams = self.num_beams.max(1);
        let mut beams = vec![Hypothesis {
            tokens: prompt.to_vec(),
            log_prob: 0.0,
        }];
        let mut finished: Vec<Finished> = Vec::new();

        let mut cur_len = prompt.len();
        while cur_len < self.max_length && !beams.is_empty() {
            // (log_prob, beam index, token)
            let mut candidates = Vec::with_capacity(beams.len() * 2 * num_beams);
            for (beam_idx, beam) in beams.iter().enumerate() {
                let log_probs = scorer.next_log_probs(&beam.tokens)?;
                for (token, log_prob) in top_k(&log_probs, 2 * num_beams) {
                    candidates.push((beam.log_prob + log_prob, beam_idx, token));
                }
            }
            candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

            let mut next_beams = Vec::with_capacity(num_beams);
            for (rank, (log_prob, beam_idx, token)) in candidates.into_iter().enumerate() {
                if token == self.eos_token_id {
                    // an end token only counts when it ranks among the best beams
                    if rank < num_beams {
                        let tokens = beams[beam_idx].tokens.clone();
                        let generated_len = tokens.len() + 1 - prompt.len();
                        self.push_finished(&mut finished, tokens, log_prob, generated_len, num_beams);
                    }
                } else {
                    let mut tokens = beams[beam_idx].tokens.clone();
                    tokens.push(token);
                    next_beams.push(Hypothesis { tokens, log_prob });
                }

                if next_beams.len() == num_beams {
                    break;
                }
            }

            beams = next_beams;
            cur_len += 1;

            if self.is_done(&finished, &beams, cur_len - prompt.len(), num_beams) {
                beams.clear();
            }
        }

        // sequences that hit the length limit compete with the finished ones
        for beam in beams {
            let generated_len = beam.tokens.len() - prompt.len();
            self.push_finished(&mut finished, beam.tokens, beam.log_prob, generated_len, num_beams);
        }

        let best = finished
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|best| best.tokens[prompt.len()..].to_vec())
            .unwrap_or_default();

        Ok(best)
    }

    fn score(&self, log_prob: f32, generated_len: usize) -> f32 {
        log_prob / (generated_len.max(1) as f32).powf(self.length_penalty)
    }

    fn push_finished(
        &self,
        finished: &mut Vec<Finished>,
        tokens: Vec<u32>,
        log_prob: f32,
        generated_len: usize,
        num_beams: usize,
    ) {
        finished.push(Finished {
            score: self.score(log_prob, generated_len),
            tokens,
        });
        if finished.len() > num_beams {
            finished.sort_by(|a, b| b.score.total_cmp(&a.score));
            finished.truncate(num_beams);
        }
    }

    fn is_done(
        &self,
        finished: &[Finished],
        beams: &[Hypothesis],
        generated_len: usize,
        num_beams: usize,
    ) -> bool {
        if finished.len() < num_beams {
            return false;
        }
        let worst_finished = finished
            .iter()
            .map(|f| f.score)
            .fold(f32::INFINITY, f32::min);
        let best_alive = beams
            .iter()
            .map(|beam| self.score(beam.log_prob, generated_len))
            .fold(f32::NEG_INFINITY, f32::max);
        worst_finished >= best_alive
    }
}

/// Returns the `k` largest values with their indices, largest first.
pub(crate) fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = values
        .iter()
        .enumerate()
        .map(|(idx, &value)| (idx as u32, value))
        .collect();

    let k = k.min(indexed.len());
    if k == 0 {
        return Vec::new();
    }
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
    }
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed
}
