//! Process naming so `ps`/`top` show which layer a worker holds.

/// Sets the calling thread's name, which is the process name when called from
/// the main thread. Linux truncates it to 15 bytes.
#[cfg(target_os = "linux")]
pub fn set_process_title(title: &str) {
    use std::ffi::CString;

    let truncated: Vec<u8> = title.bytes().filter(|b| *b != 0).take(15).collect();
    let Ok(name) = CString::new(truncated) else {
        return;
    };

    // SAFETY: PR_SET_NAME reads a NUL-terminated string of at most 16 bytes.
    let rc = unsafe { libc::prctl(libc::PR_SET_NAME, name.as_ptr() as libc::c_ulong, 0, 0, 0) };
    if rc != 0 {
        tracing::debug!(title, error = %std::io::Error::last_os_error(), "failed to set process title");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_title(title: &str) {
    tracing::debug!(title, "process titles are not supported on this platform");
}
