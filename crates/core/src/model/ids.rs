use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value.
            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a live question in the question bank.
    QuestionId
);
id_type!(
    /// Unique identifier for a quiz module within a course.
    QuizModuleId
);
id_type!(
    /// Unique identifier for a single quiz attempt.
    AttemptId
);
id_type!(
    /// Unique identifier for a multi-section practice test attempt.
    PracticeTestId
);
id_type!(
    /// Unique identifier for an enrollment.
    EnrollmentId
);
id_type!(
    /// Unique identifier for a course.
    CourseId
);
id_type!(
    /// Unique identifier for a lesson content item.
    ContentId
);
id_type!(
    /// Unique identifier for a learner.
    UserId
);
