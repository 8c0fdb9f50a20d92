use md5::{Digest, Md5};

/// Replaces the file stem of `name` with its md5 hex digest, keeping the
/// directory and the extension: `a/b/photo.jpg` -> `a/b/<md5("photo")>.jpg`.
pub fn hashed_name(name: &str) -> String {
    let (dir, file_name) = match name.rfind('/') {
        Some(index) => (&name[..=index], &name[index + 1..]),
        None => ("", name),
    };

    let (stem, extension) = split_extension(file_name);
    let digest = hex::encode(Md5::digest(stem.as_bytes()));

    format!("{}{}{}", dir, digest, extension)
}

// A leading dot marks a hidden file, not an extension.
fn split_extension(file_name: &str) -> (&str, &str) {
    let leading_dots = file_name.len() - file_name.trim_start_matches('.').len();
    match file_name[leading_dots..].rfind('.') {
        Some(index) => file_name.split_at(leading_dots + index),
        None => (file_name, ""),
    }
}
