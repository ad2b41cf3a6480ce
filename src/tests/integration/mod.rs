mod test_crawl_pipeline;
mod test_resume;
