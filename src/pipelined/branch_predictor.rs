//! Branch predictor that supports predicting and updating
//! based on observed branch behavior

const PREDICTOR_BUFFER_SIZE: usize = 16;
const HISTORY_WIDTH: usize = 4;
const HISTORY_SIZE: usize = 1 << HISTORY_WIDTH;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PredictorHeuristic {
    AlwaysTaken,
    #[default]
    AlwaysNotTaken,
    /// One two-bit counter per bucket
    Bimodal,
    /// Per-bucket history selecting among two-bit counters
    Adaptive,
}

impl PredictorHeuristic {
    pub const ALL: [PredictorHeuristic; 4] = [
        PredictorHeuristic::AlwaysTaken,
        PredictorHeuristic::AlwaysNotTaken,
        PredictorHeuristic::Bimodal,
        PredictorHeuristic::Adaptive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PredictorHeuristic::AlwaysTaken => "Always Taken",
            PredictorHeuristic::AlwaysNotTaken => "Always Not Taken",
            PredictorHeuristic::Bimodal => "Bimodal",
            PredictorHeuristic::Adaptive => "Self Adjustment",
        }
    }

    /// Command-line short name
    pub fn code(self) -> &'static str {
        match self {
            PredictorHeuristic::AlwaysTaken => "AT",
            PredictorHeuristic::AlwaysNotTaken => "ANT",
            PredictorHeuristic::Bimodal => "BI",
            PredictorHeuristic::Adaptive => "SA",
        }
    }
}

/// Two-bit saturating counter.
/// 0 and 1 predict not taken, 2 and 3 predict taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Counter(u8);

impl Counter {
    pub fn value(self) -> u8 {
        self.0
    }

    pub fn predict(self) -> bool {
        self.0 >= 2
    }

    /// Moves towards the observed outcome.
    /// `success` means the previous prediction was right.
    fn transition(self, success: bool) -> Self {
        Counter(match (self.0, success) {
            (0, true) => 0,
            (0, false) => 1,
            (1, true) => 0,
            (1, false) => 2,
            (2, true) => 3,
            (2, false) => 1,
            (_, true) => 3,
            (_, false) => 2,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Bucket {
    counter: Counter,
    history: u8,
    patterns: [Counter; HISTORY_SIZE],
}

pub struct BranchPredictor {
    heuristic: PredictorHeuristic,
    buffer: [Bucket; PREDICTOR_BUFFER_SIZE],
}

impl BranchPredictor {
    pub fn new(heuristic: PredictorHeuristic) -> Self {
        Self { heuristic, buffer: [Bucket::default(); PREDICTOR_BUFFER_SIZE] }
    }

    pub fn heuristic(&self) -> PredictorHeuristic {
        self.heuristic
    }

    fn index(pc: u64) -> usize {
        ((pc >> 2) as usize) % PREDICTOR_BUFFER_SIZE
    }

    /// The counter consulted for a branch at `pc`
    pub fn counter(&self, pc: u64) -> Counter {
        let bucket = &self.buffer[Self::index(pc)];
        match self.heuristic {
            PredictorHeuristic::Adaptive => bucket.patterns[bucket.history as usize],
            _ => bucket.counter,
        }
    }

    pub fn predict(&self, pc: u64) -> bool {
        match self.heuristic {
            PredictorHeuristic::AlwaysTaken => true,
            PredictorHeuristic::AlwaysNotTaken => false,
            PredictorHeuristic::Bimodal | PredictorHeuristic::Adaptive => {
                self.counter(pc).predict()
            }
        }
    }

    /// Trains the predictor with the resolved outcome of the branch at `pc`
    pub fn update(&mut self, pc: u64, taken: bool) {
        let bucket = &mut self.buffer[Self::index(pc)];
        match self.heuristic {
            PredictorHeuristic::AlwaysTaken
            | PredictorHeuristic::AlwaysNotTaken => {}
            PredictorHeuristic::Bimodal => {
                let success = bucket.counter.predict() == taken;
                bucket.counter = bucket.counter.transition(success);
            }
            PredictorHeuristic::Adaptive => {
                let pattern = &mut bucket.patterns[bucket.history as usize];
                let success = pattern.predict() == taken;
                *pattern = pattern.transition(success);
                bucket.history = ((bucket.history << 1) | taken as u8)
                    & (HISTORY_SIZE as u8 - 1);
            }
        }
    }
}
