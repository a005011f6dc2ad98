pub mod edit;
pub mod file_search;
pub mod list_dir;
pub mod memory_save;
pub mod memory_search;
pub mod read;
pub mod run_python;
pub mod set_profile;
pub mod tool_call;
pub mod write;

#[cfg(test)]
mod output_category_tests {
    use crate::tool::OutputCategory;
    use crate::Tool;

    #[test]
    fn read_is_filecontent() {
        assert_eq!(super::read::ReadTool.output_category(), OutputCategory::FileContent);
    }

    #[test]
    fn file_search_is_matchlist() {
        assert_eq!(super::file_search::FileSearchTool.output_category(), OutputCategory::MatchList);
    }

    #[test]
    fn run_python_is_headtail() {
        let t = super::run_python::RunPythonTool::default();
        assert_eq!(t.output_category(), OutputCategory::HeadTail);
    }

    #[test]
    fn write_is_generic() {
        assert_eq!(super::write::WriteTool.output_category(), OutputCategory::Generic);
    }

    #[test]
    fn edit_is_generic() {
        assert_eq!(super::edit::EditTool.output_category(), OutputCategory::Generic);
    }

    #[test]
    fn list_dir_is_generic() {
        assert_eq!(super::list_dir::ListDirTool.output_category(), OutputCategory::Generic);
    }
}
