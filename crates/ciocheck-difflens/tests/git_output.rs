use ciocheck_difflens::filter::filter_lines;
use ciocheck_difflens::parser::parse_line_changes;
use std::path::Path;

#[test]
fn parse_staged_diff_with_new_and_modified_files() {
    let diff = "\
diff --git a/pkg/__init__.py b/pkg/__init__.py
new file mode 100644
index 0000000..e69de29
diff --git a/pkg/core.py b/pkg/core.py
index 3b18e51..a4c5b3a 100644
--- a/pkg/core.py
+++ b/pkg/core.py
@@ -1,4 +1,6 @@
 import os
+import sys


 def main():
@@ -12,3 +14,4 @@ def main():
     return 0
-
+
+# trailing
diff --git a/README.md b/README.md
index 1111111..2222222 100644
--- a/README.md
+++ b/README.md
@@ -1 +1 @@
-ciocheck
+ciocheck 0.3
";
    let changes = parse_line_changes(diff).unwrap();
    assert_eq!(changes.len(), 3);

    let core = &changes[Path::new("pkg/core.py")];
    assert_eq!(core.added(), &[2, 15, 16]);
    assert_eq!(core.deleted(), &[15]);

    let init = &changes[Path::new("pkg/__init__.py")];
    assert!(init.added().is_empty());

    let python_only = filter_lines(changes, &["py".to_string()]);
    assert!(!python_only.contains_key(Path::new("README.md")));
    assert_eq!(python_only.len(), 2);
}
