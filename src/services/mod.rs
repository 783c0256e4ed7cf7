pub(crate) mod grader;
pub(crate) mod grading_client;
pub(crate) mod image_files;
