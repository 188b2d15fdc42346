use std::path::{Path, PathBuf};

use mangashelf::{CatalogDb, model::NewTitle};
use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;

fn setup_fixture(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = CatalogDb::open(&data_dir.join("catalog.redb"))?;
    for (id, title, alts) in [
        ("aot", "Shingeki no Kyojin", vec!["Attack on Titan"]),
        ("op", "One Piece", vec![]),
        ("opm", "One-Punch Man", vec![]),
    ] {
        catalog.create_title(NewTitle {
            id: Some(id.to_string()),
            title: title.to_string(),
            alternative_titles: alts.into_iter().map(String::from).collect(),
            ..Default::default()
        })?;
    }
    Ok(())
}

#[tokio::test]
async fn mcp_stdio_search_roundtrip() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let bin = mangashelf_bin()?;
    let transport = TokioChildProcess::new(
        tokio::process::Command::new(bin).configure(|cmd| {
            cmd.arg("mcp").env("MANGASHELF_DATA_DIR", tempdir.path());
        }),
    )?;

    let client = ().serve(transport).await?;

    let args = json!({ "query": "attack on titan", "limit": 5 });
    let result = client
        .peer()
        .call_tool(
            CallToolRequestParams::new("mangashelf_search")
                .with_arguments(args.as_object().unwrap().clone()),
        )
        .await?;

    let structured = result.structured_content.expect("structured content");
    let items = structured
        .get("items")
        .and_then(|v| v.as_array())
        .expect("items array");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("id").and_then(|v| v.as_str()), Some("aot"));
    assert_eq!(structured.get("page").and_then(|v| v.as_u64()), Some(1));

    let get_args = json!({ "id": "op" });
    let get_result = client
        .peer()
        .call_tool(
            CallToolRequestParams::new("mangashelf_get_title")
                .with_arguments(get_args.as_object().unwrap().clone()),
        )
        .await?;
    let title = get_result.structured_content.expect("title content");
    assert_eq!(
        title.get("title").and_then(|v| v.as_str()),
        Some("One Piece")
    );
    assert_eq!(title.pointer("/stats/views").and_then(|v| v.as_u64()), Some(0));

    client.cancel().await?;
    Ok(())
}

fn mangashelf_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_mangashelf") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("mangashelf");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
