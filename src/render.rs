use tasksync_services::{Notice, Task, TaskFilter, Theme};

/// Plain-text listing. Positions refer to the unfiltered order so they can be
/// passed back to `toggle`/`edit`/`delete`.
pub fn task_list(all: &[Task], filter: TaskFilter) -> String {
    let mut out = String::new();
    let shown: Vec<(usize, &Task)> = all
        .iter()
        .enumerate()
        .filter(|(_, t)| filter.matches(t))
        .collect();

    if shown.is_empty() {
        out.push_str("  (no tasks)\n");
    }
    for (index, task) in shown {
        let mark = if task.completed { "x" } else { " " };
        out.push_str(&format!(
            "[{}] {:>3}. {}  ({})\n",
            mark,
            index + 1,
            task.text,
            task.id
        ));
    }

    let left = all.iter().filter(|t| !t.completed).count();
    out.push_str(&format!(
        "{} item{} left | {} total | filter: {}\n",
        left,
        if left == 1 { "" } else { "s" },
        all.len(),
        filter.label()
    ));
    out
}

pub fn notice(notice: Option<&Notice>) -> Option<String> {
    notice.map(|n| format!("! {}", n))
}

pub fn theme(theme: Theme) -> String {
    format!("theme: {}", theme)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, text: &str, completed: bool) -> Task {
        Task {
            id: id.into(),
            text: text.into(),
            completed,
            created_at: 1,
        }
    }

    #[test]
    fn test_filtered_listing_keeps_positions() {
        let tasks = vec![task("a", "one", false), task("b", "two", true)];
        let out = task_list(&tasks, TaskFilter::Completed);
        assert!(out.contains("[x]   2. two  (b)"));
        assert!(!out.contains("one"));
        assert!(out.contains("1 item left | 2 total | filter: Completed"));
    }

    #[test]
    fn test_empty_listing() {
        let out = task_list(&[], TaskFilter::All);
        assert!(out.contains("(no tasks)"));
        assert!(out.contains("0 items left"));
    }
}
