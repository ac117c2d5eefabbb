use std::path::Path;

pub fn display(p: &Path) -> String {
	p.to_string_lossy().into_owned()
}
