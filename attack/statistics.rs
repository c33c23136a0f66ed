//! # Statistic Tensors and Membership
//!
//! Typed wrappers around the raw `ndarray` inputs of an attack, plus the shape
//! validation that must pass before any population is assembled.
//!
//! - Target statistics are either `[model, example, repetition]` or
//!   `[model, configuration, example, repetition]`. The 4-D form is read on its
//!   diagonal, i.e. each target model at its own configuration.
//! - Shadow statistics are always `[model, configuration, example, repetition]`.
//! - The membership matrix is `[model, example]`, `true` iff the example was in that
//!   model's training set.

use ndarray::{Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2, ArrayView3, Axis, Ix3, Ix4};
use thiserror::Error;

/// Shape and alignment failures between the attack inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("{what} must have {expected} dimensions, but the stored array has {found}.")]
    WrongDimensionality {
        what: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("{0} contains no data: every axis must have a non-zero length.")]
    EmptyTensor(&'static str),
    #[error(
        "Model counts disagree: target statistics have {target}, shadow statistics have {shadow}, membership has {membership} rows."
    )]
    ModelCountMismatch {
        target: usize,
        shadow: usize,
        membership: usize,
    },
    #[error(
        "Example counts disagree: target statistics have {target}, shadow statistics have {shadow}, membership has {membership} columns."
    )]
    ExampleCountMismatch {
        target: usize,
        shadow: usize,
        membership: usize,
    },
    #[error(
        "Repetition counts disagree: target statistics have {target}, shadow statistics have {shadow}."
    )]
    RepetitionCountMismatch { target: usize, shadow: usize },
    #[error(
        "Shadow statistics cover {configurations} configurations, but {models} models need their own diagonal configuration."
    )]
    MissingDiagonal { models: usize, configurations: usize },
    #[error(
        "Only {0} shadow configuration(s) available; selecting an alternative configuration needs at least two."
    )]
    NoAlternativeConfiguration(usize),
    #[error("Membership row {row} has {found} entries, expected {expected}.")]
    RaggedMembership {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Requested {requested} models, but only {available} membership rows are available.")]
    NotEnoughMembershipRows { requested: usize, available: usize },
    #[error("{what} contains a non-finite value at flat index {index}.")]
    NonFiniteStatistic { what: &'static str, index: usize },
}

/// Statistics observed on the target models.
#[derive(Debug, Clone)]
pub enum TargetStatistics {
    /// `[model, example, repetition]`
    PerModel(Array3<f64>),
    /// `[model, configuration, example, repetition]`, read on the diagonal.
    PerConfiguration(Array4<f64>),
}

impl TargetStatistics {
    /// Interprets a dynamically-shaped array as target statistics.
    pub fn from_dyn(array: ArrayD<f64>) -> Result<Self, ShapeError> {
        match array.ndim() {
            3 => Ok(Self::PerModel(into_fixed::<Ix3>(array, "Target statistics")?)),
            4 => Ok(Self::PerConfiguration(into_fixed::<Ix4>(
                array,
                "Target statistics",
            )?)),
            found => Err(ShapeError::WrongDimensionality {
                what: "Target statistics",
                expected: "3 or 4",
                found,
            }),
        }
    }

    pub fn n_models(&self) -> usize {
        match self {
            Self::PerModel(a) => a.len_of(Axis(0)),
            Self::PerConfiguration(a) => a.len_of(Axis(0)),
        }
    }

    pub fn n_examples(&self) -> usize {
        match self {
            Self::PerModel(a) => a.len_of(Axis(1)),
            Self::PerConfiguration(a) => a.len_of(Axis(2)),
        }
    }

    pub fn n_repetitions(&self) -> usize {
        match self {
            Self::PerModel(a) => a.len_of(Axis(2)),
            Self::PerConfiguration(a) => a.len_of(Axis(3)),
        }
    }

    /// The `[example, repetition]` observations of one target model at its own
    /// configuration.
    pub fn observations(&self, model: usize) -> ArrayView2<'_, f64> {
        match self {
            Self::PerModel(a) => a.index_axis(Axis(0), model),
            Self::PerConfiguration(a) => a.index_axis(Axis(0), model).index_axis_move(Axis(0), model),
        }
    }

    fn values(&self) -> Box<dyn Iterator<Item = &f64> + '_> {
        match self {
            Self::PerModel(a) => Box::new(a.iter()),
            Self::PerConfiguration(a) => Box::new(a.iter()),
        }
    }

    fn shape(&self) -> &[usize] {
        match self {
            Self::PerModel(a) => a.shape(),
            Self::PerConfiguration(a) => a.shape(),
        }
    }
}

/// Shadow statistics, `[model, configuration, example, repetition]`.
#[derive(Debug, Clone)]
pub struct ShadowStatistics {
    values: Array4<f64>,
}

impl ShadowStatistics {
    pub fn new(values: Array4<f64>) -> Self {
        Self { values }
    }

    pub fn from_dyn(array: ArrayD<f64>) -> Result<Self, ShapeError> {
        if array.ndim() != 4 {
            return Err(ShapeError::WrongDimensionality {
                what: "Shadow statistics",
                expected: "4",
                found: array.ndim(),
            });
        }
        Ok(Self::new(into_fixed::<Ix4>(array, "Shadow statistics")?))
    }

    pub fn n_models(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn n_configurations(&self) -> usize {
        self.values.len_of(Axis(1))
    }

    pub fn n_examples(&self) -> usize {
        self.values.len_of(Axis(2))
    }

    pub fn n_repetitions(&self) -> usize {
        self.values.len_of(Axis(3))
    }

    /// Every model's statistics at one configuration, `[model, example, repetition]`.
    pub fn column(&self, configuration: usize) -> ArrayView3<'_, f64> {
        self.values.index_axis(Axis(1), configuration)
    }

    /// One model's statistics at one configuration, `[example, repetition]`.
    pub fn model_at(&self, model: usize, configuration: usize) -> ArrayView2<'_, f64> {
        self.values
            .index_axis(Axis(0), model)
            .index_axis_move(Axis(0), configuration)
    }
}

/// Training membership, `[model, example]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipMatrix {
    members: Array2<bool>,
}

impl MembershipMatrix {
    pub fn new(members: Array2<bool>) -> Self {
        Self { members }
    }

    /// Builds the matrix from per-model rows, rejecting ragged input.
    pub fn from_rows(rows: &[Vec<bool>]) -> Result<Self, ShapeError> {
        let n_examples = rows.first().map_or(0, Vec::len);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != n_examples {
                return Err(ShapeError::RaggedMembership {
                    row,
                    expected: n_examples,
                    found: values.len(),
                });
            }
        }
        let flat: Vec<bool> = rows.iter().flatten().copied().collect();
        let members = Array2::from_shape_vec((rows.len(), n_examples), flat)
            .map_err(|_| ShapeError::EmptyTensor("Membership matrix"))?;
        Ok(Self::new(members))
    }

    /// Keeps only the first `num_models` rows.
    pub fn truncated(self, num_models: usize) -> Result<Self, ShapeError> {
        let available = self.n_models();
        if num_models > available {
            return Err(ShapeError::NotEnoughMembershipRows {
                requested: num_models,
                available,
            });
        }
        let members = self
            .members
            .slice_axis(Axis(0), (0..num_models).into())
            .to_owned();
        Ok(Self::new(members))
    }

    pub fn n_models(&self) -> usize {
        self.members.nrows()
    }

    pub fn n_examples(&self) -> usize {
        self.members.ncols()
    }

    pub fn row(&self, model: usize) -> ArrayView1<'_, bool> {
        self.members.row(model)
    }

    pub fn is_member(&self, model: usize, example: usize) -> bool {
        self.members[[model, example]]
    }

    /// Indices of the examples `model` trained on, in ascending order.
    pub fn training_examples(&self, model: usize) -> Vec<usize> {
        self.row(model)
            .iter()
            .enumerate()
            .filter_map(|(example, &member)| member.then_some(example))
            .collect()
    }
}

/// The validated, read-only inputs of one attack run.
#[derive(Debug, Clone)]
pub struct AttackInputs {
    target: TargetStatistics,
    shadow: ShadowStatistics,
    membership: MembershipMatrix,
}

impl AttackInputs {
    /// Validates that the three inputs describe the same models, examples and
    /// repetitions, and that the shadow configurations cover every model's diagonal.
    pub fn new(
        target: TargetStatistics,
        shadow: ShadowStatistics,
        membership: MembershipMatrix,
    ) -> Result<Self, ShapeError> {
        if target.shape().contains(&0) {
            return Err(ShapeError::EmptyTensor("Target statistics"));
        }
        if shadow.values.shape().contains(&0) {
            return Err(ShapeError::EmptyTensor("Shadow statistics"));
        }
        if membership.members.is_empty() {
            return Err(ShapeError::EmptyTensor("Membership matrix"));
        }

        if target.n_models() != shadow.n_models() || target.n_models() != membership.n_models() {
            return Err(ShapeError::ModelCountMismatch {
                target: target.n_models(),
                shadow: shadow.n_models(),
                membership: membership.n_models(),
            });
        }
        if target.n_examples() != shadow.n_examples()
            || target.n_examples() != membership.n_examples()
        {
            return Err(ShapeError::ExampleCountMismatch {
                target: target.n_examples(),
                shadow: shadow.n_examples(),
                membership: membership.n_examples(),
            });
        }
        if target.n_repetitions() != shadow.n_repetitions() {
            return Err(ShapeError::RepetitionCountMismatch {
                target: target.n_repetitions(),
                shadow: shadow.n_repetitions(),
            });
        }
        if let TargetStatistics::PerConfiguration(values) = &target {
            if values.len_of(Axis(1)) < target.n_models() {
                return Err(ShapeError::MissingDiagonal {
                    models: target.n_models(),
                    configurations: values.len_of(Axis(1)),
                });
            }
        }
        if shadow.n_configurations() < shadow.n_models() {
            return Err(ShapeError::MissingDiagonal {
                models: shadow.n_models(),
                configurations: shadow.n_configurations(),
            });
        }
        if shadow.n_configurations() < 2 {
            return Err(ShapeError::NoAlternativeConfiguration(
                shadow.n_configurations(),
            ));
        }

        if let Some(index) = target.values().position(|v| !v.is_finite()) {
            return Err(ShapeError::NonFiniteStatistic {
                what: "Target statistics",
                index,
            });
        }
        if let Some(index) = shadow.values.iter().position(|v| !v.is_finite()) {
            return Err(ShapeError::NonFiniteStatistic {
                what: "Shadow statistics",
                index,
            });
        }

        Ok(Self {
            target,
            shadow,
            membership,
        })
    }

    pub fn target(&self) -> &TargetStatistics {
        &self.target
    }

    pub fn shadow(&self) -> &ShadowStatistics {
        &self.shadow
    }

    pub fn membership(&self) -> &MembershipMatrix {
        &self.membership
    }

    pub fn n_models(&self) -> usize {
        self.target.n_models()
    }

    pub fn n_examples(&self) -> usize {
        self.target.n_examples()
    }
}

fn into_fixed<D: ndarray::Dimension>(
    array: ArrayD<f64>,
    what: &'static str,
) -> Result<ndarray::Array<f64, D>, ShapeError> {
    let found = array.ndim();
    array
        .into_dimensionality::<D>()
        .map_err(|_| ShapeError::WrongDimensionality {
            what,
            expected: "a fixed number of",
            found,
        })
}
