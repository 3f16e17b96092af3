//! List posts from the CMS

use anyhow::Result;
use std::io::Write;

use crate::content::Post;
use crate::generator::Generator;
use crate::helpers::format_publication_date;
use crate::listing::ListingController;
use crate::Spacetraveling;

/// Print posts page by page, loading at most `max_pages` extra pages
pub async fn run(site: &Spacetraveling, max_pages: Option<usize>) -> Result<()> {
    let generator = Generator::new(site)?;
    let props = generator.static_home_props().await?;
    let mut controller = ListingController::new(props.posts_pagination);

    let mut out = std::io::stdout();
    print_posts(&mut out, controller.posts())?;

    let mut loaded = 0;
    while controller.can_load_more() && max_pages.map_or(true, |max| loaded < max) {
        let before = controller.posts().len();
        controller.load_more(generator.client()).await?;
        print_posts(&mut out, &controller.posts()[before..])?;
        loaded += 1;
    }

    writeln!(out, "Posts ({}):", controller.posts().len())?;
    if controller.can_load_more() {
        writeln!(out, "  (more available)")?;
    }

    Ok(())
}

fn print_posts<W: Write>(out: &mut W, posts: &[Post]) -> Result<()> {
    for post in posts {
        writeln!(out, "{}", format_line(post))?;
    }
    Ok(())
}

fn format_line(post: &Post) -> String {
    format!(
        "  {} - {} by {} [{}]",
        format_publication_date(post.first_publication_date.as_deref()),
        post.title,
        post.author,
        post.uid.as_deref().unwrap_or("-")
    )
}
