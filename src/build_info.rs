/// Commit the binary was built from, stamped by build.rs when git is available.
pub fn git_sha() -> Option<&'static str> {
    option_env!("TASKLIFT_BUILD_GIT_SHA")
}
