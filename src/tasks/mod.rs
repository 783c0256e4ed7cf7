pub(crate) mod grading;
